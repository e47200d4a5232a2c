//! End-to-end insertion pipeline: select build → resolve artifacts →
//! resolve component versions → compile changelog → update pull request.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use buildrelay_artifacts::{ArtifactResolver, ResolveOptions};
use buildrelay_changelog::{ChangelogCompiler, ChangelogPolicy, CompiledChangelog};
use buildrelay_manifest::{ManifestLocator, ManifestResolver};
use buildrelay_selector::BuildQuery;
use buildrelay_shared::config::AppConfig;
use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::service::{BuildService, CommitFeed, PolicyHost, PullRequestHost};
use buildrelay_shared::types::{BuildCandidate, CommitRecord, Component, PullRequestSpec};

use crate::requeue;

// ---------------------------------------------------------------------------
// Collaborators & options
// ---------------------------------------------------------------------------

/// External capabilities the pipeline drives.
pub struct Collaborators<'a> {
    pub builds: &'a dyn BuildService,
    pub commits: &'a dyn CommitFeed,
    pub pull_requests: &'a dyn PullRequestHost,
    pub policies: &'a dyn PolicyHost,
}

/// Configuration for one insertion attempt.
#[derive(Debug, Clone)]
pub struct InsertionOptions {
    /// Project that owns the upstream builds.
    pub project: String,
    /// Build queue producing insertable builds.
    pub queue: String,
    /// Downstream branch the insertion PR targets.
    pub target_branch: String,
    /// Human-readable insertion name.
    pub insertion_name: String,
    /// Fixed name of the modern container artifact.
    pub modern_artifact_name: String,
    /// Pre-resolved local artifacts directory (offline/test runs).
    pub local_artifacts_dir: Option<PathBuf>,
    /// Root under which scratch directories are created.
    pub scratch_root: PathBuf,
    /// Marker line announcing manifest URLs in the build log.
    pub manifest_marker: String,
    /// Manifest file extension.
    pub manifest_extension: String,
    /// Changelog classification policy.
    pub changelog_policy: ChangelogPolicy,
    /// Hard character budget for the changelog.
    pub changelog_hard_limit: usize,
    /// Build number of the previously inserted build; enables the commit
    /// diff and changelog.
    pub previous_build_number: Option<String>,
    /// Named build policy to requeue on the PR after update.
    pub requeue_policy: Option<String>,
    /// Wall-clock bound for the requeue poll.
    pub requeue_timeout: Duration,
    /// Enable auto-complete on the PR.
    pub auto_complete: bool,
    /// Compose everything but skip the pull-request update.
    pub dry_run: bool,
}

impl InsertionOptions {
    /// Options from the app config, with per-run fields left at their
    /// defaults (no previous build, no requeue, live run).
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            project: config.insertion.project.clone(),
            queue: config.insertion.queue.clone(),
            target_branch: config.insertion.target_branch.clone(),
            insertion_name: config.insertion.insertion_name.clone(),
            modern_artifact_name: config.artifacts.modern_name.clone(),
            local_artifacts_dir: config
                .insertion
                .local_artifacts_dir
                .as_ref()
                .map(PathBuf::from),
            scratch_root: std::env::temp_dir(),
            manifest_marker: config.manifest.marker.clone(),
            manifest_extension: config.manifest.extension.clone(),
            changelog_policy: ChangelogPolicy::from_config(&config.changelog)?,
            changelog_hard_limit: config.changelog.hard_limit,
            previous_build_number: None,
            requeue_policy: None,
            requeue_timeout: Duration::from_secs(config.requeue.timeout_secs),
            auto_complete: false,
            dry_run: false,
        })
    }

    fn build_query(&self) -> BuildQuery<'_> {
        BuildQuery {
            project: &self.project,
            queue: &self.queue,
            branch: &self.target_branch,
            result_filter: None,
            modern_artifact_name: &self.modern_artifact_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome & progress
// ---------------------------------------------------------------------------

/// Result of a completed insertion attempt.
#[derive(Debug)]
pub struct InsertionOutcome {
    /// The inserted build.
    pub build: BuildCandidate,
    /// Local root directory of its artifacts.
    pub artifacts_root: PathBuf,
    /// Components with resolved versions.
    pub components: Vec<Component>,
    /// Composed PR description.
    pub description: String,
    /// Updated PR id; `None` on dry runs.
    pub pull_request_id: Option<u64>,
    /// Merged PRs rendered in the changelog.
    pub merged_pr_count: usize,
    /// Plain commits rendered in the changelog.
    pub commit_count: usize,
    /// Whether the changelog was truncated to fit the budget.
    pub truncated: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &InsertionOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &InsertionOutcome) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run one insertion attempt.
#[instrument(skip_all, fields(queue = %options.queue, branch = %options.target_branch))]
pub async fn run_insertion(
    ctx: &Collaborators<'_>,
    options: &InsertionOptions,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<InsertionOutcome> {
    let start = Instant::now();
    let query = options.build_query();

    // --- Phase 1: Select build ---
    progress.phase("Selecting insertable build");
    let build = buildrelay_selector::latest_insertable(ctx.builds, &query).await?;

    // --- Phase 2: Resolve artifacts ---
    progress.phase("Resolving artifacts");
    let mut resolve_options = ResolveOptions::new(
        &options.project,
        &options.insertion_name,
        &options.target_branch,
        &options.modern_artifact_name,
    );
    resolve_options.local_override = options.local_artifacts_dir.clone();
    resolve_options.scratch_root = options.scratch_root.clone();

    let resolver = ArtifactResolver::new(ctx.builds, resolve_options);
    let artifacts = resolver.resolve(&build, cancel).await?;
    artifacts.validate()?;

    // --- Phase 3: Resolve component versions ---
    progress.phase("Resolving component versions");
    let locator = ManifestLocator::new(&options.manifest_marker, &options.manifest_extension)?;
    let manifest_resolver = ManifestResolver::new(ctx.builds, locator)?;
    let components = manifest_resolver
        .components_for_build(&options.project, build.id, Some(artifacts.root()))
        .await?;

    // --- Phase 4: Compile changelog ---
    progress.phase("Compiling changelog");
    let commits = commits_since_previous(ctx, options, &query, &build).await?;
    let compiled = ChangelogCompiler::new(
        options.changelog_policy.clone(),
        options.changelog_hard_limit,
        repository_web_url(&build),
    )
    .compile(&commits);

    let description = compose_description(options, &build, &components, &compiled);

    if cancel.is_cancelled() {
        return Err(BuildRelayError::Cancelled);
    }

    // --- Phase 5: Update pull request ---
    let pull_request_id = if options.dry_run {
        info!("dry run, skipping pull-request update");
        None
    } else {
        progress.phase("Updating pull request");
        let spec = PullRequestSpec {
            title: format!(
                "[{}] {} build {}",
                options.target_branch, options.insertion_name, build.build_number
            ),
            description: description.clone(),
            source_branch: format!(
                "insertion/{}/{}",
                options.target_branch, build.build_number
            ),
            target_branch: options.target_branch.clone(),
        };
        let id = ctx.pull_requests.upsert_pull_request(&spec).await?;

        // Auto-complete and policy requeue are cosmetic: log and continue.
        if options.auto_complete {
            if let Err(e) = ctx.pull_requests.set_auto_complete(id).await {
                warn!(pull_request_id = id, error = %e, "auto-complete assignment failed");
            }
        }
        if let Some(policy) = &options.requeue_policy {
            if let Err(e) =
                requeue::requeue_policy(ctx.policies, id, policy, options.requeue_timeout).await
            {
                warn!(pull_request_id = id, policy, error = %e, "policy requeue failed");
            }
        }

        Some(id)
    };

    let outcome = InsertionOutcome {
        artifacts_root: artifacts.root().to_path_buf(),
        components,
        description,
        pull_request_id,
        merged_pr_count: compiled.merged_pr_count,
        commit_count: compiled.commit_count,
        truncated: compiled.truncated,
        elapsed: start.elapsed(),
        build,
    };

    progress.done(&outcome);

    info!(
        build_number = %outcome.build.build_number,
        components = outcome.components.len(),
        merged_prs = outcome.merged_pr_count,
        pull_request_id = ?outcome.pull_request_id,
        elapsed_ms = outcome.elapsed.as_millis(),
        "insertion attempt complete"
    );

    Ok(outcome)
}

/// Fetch the commit diff between the previously inserted build and `build`.
///
/// Returns an empty list when no previous build is configured, when either
/// side lacks a source revision, or when the repository kind is unsupported
/// (logged, not fatal: the description still carries the version table).
async fn commits_since_previous(
    ctx: &Collaborators<'_>,
    options: &InsertionOptions,
    query: &BuildQuery<'_>,
    build: &BuildCandidate,
) -> Result<Vec<CommitRecord>> {
    let Some(previous_number) = &options.previous_build_number else {
        return Ok(Vec::new());
    };

    let previous =
        buildrelay_selector::build_by_number(ctx.builds, query, previous_number).await?;

    let (Some(from), Some(to)) = (
        previous.repository.source_revision.as_deref(),
        build.repository.source_revision.as_deref(),
    ) else {
        warn!("source revision missing on one of the builds, skipping changelog");
        return Ok(Vec::new());
    };

    match ctx
        .commits
        .commits_between(&build.repository, from, to)
        .await
    {
        Ok(commits) => Ok(commits),
        Err(BuildRelayError::Unsupported(reason)) => {
            warn!(reason, "commit diff unavailable, changelog limited to versions");
            Ok(Vec::new())
        }
        Err(other) => Err(other),
    }
}

/// Web URL of the source repository, used for changelog links.
fn repository_web_url(build: &BuildCandidate) -> String {
    format!("https://github.com/{}", build.repository.id)
}

/// Compose the PR description: heading, component version table, changelog.
fn compose_description(
    options: &InsertionOptions,
    build: &BuildCandidate,
    components: &[Component],
    changelog: &CompiledChangelog,
) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# {} build {}\n\n",
        options.insertion_name, build.build_number
    ));
    out.push_str(&format!(
        "Inserting [build {}]({}) into `{}`.\n\n",
        build.build_number, build.web_url, options.target_branch
    ));

    if !components.is_empty() {
        out.push_str("| Component | Version |\n| --- | --- |\n");
        for component in components {
            out.push_str(&format!(
                "| {} | {} |\n",
                component.name,
                component.version.as_deref().unwrap_or("n/a")
            ));
        }
        out.push('\n');
    }

    out.push_str(&changelog.text);
    out
}
