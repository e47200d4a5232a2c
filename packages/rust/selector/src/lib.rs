//! Insertable-build selection.
//!
//! Given a build queue and a downstream target branch, picks the most
//! recently finished upstream build that is eligible for insertion: not
//! opted out via the branch-keyed tag, and carrying either the modern
//! container artifact or the legacy drop artifact named after the build
//! number.

pub mod version;

use tracing::{debug, info};

use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::service::BuildService;
use buildrelay_shared::types::{BuildCandidate, BuildOutcome};

pub use version::{BuildNumber, round_trips};

// ---------------------------------------------------------------------------
// BuildQuery
// ---------------------------------------------------------------------------

/// Parameters identifying the stream of candidate builds.
#[derive(Debug, Clone)]
pub struct BuildQuery<'a> {
    /// Project owning the builds.
    pub project: &'a str,
    /// Build queue (definition) name.
    pub queue: &'a str,
    /// Target branch in bare form (no `refs/heads/` prefix).
    pub branch: &'a str,
    /// Optional result filter passed through to the build service.
    pub result_filter: Option<BuildOutcome>,
    /// Fixed name of the modern container artifact.
    pub modern_artifact_name: &'a str,
}

impl BuildQuery<'_> {
    fn context(&self) -> String {
        format!(
            "queue '{}' in project '{}' on branch '{}'",
            self.queue, self.project, self.branch
        )
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Return the most recently finished insertable build for `query`.
///
/// Historical builds may have been recorded under either `refs/heads/<branch>`
/// or bare `<branch>`, so both forms are queried and unioned before ordering.
pub async fn latest_insertable(
    service: &dyn BuildService,
    query: &BuildQuery<'_>,
) -> Result<BuildCandidate> {
    let candidates = fetch_candidates(service, query).await?;

    for build in &candidates {
        if build.opted_out_of(query.branch) {
            debug!(
                build_number = %build.build_number,
                branch = query.branch,
                "build opted out of insertion, skipping"
            );
            continue;
        }

        if has_insertion_artifact(service, query, build).await? {
            info!(
                build_id = build.id,
                build_number = %build.build_number,
                finished_at = %build.finished_at,
                "selected insertable build"
            );
            return Ok(build.clone());
        }

        debug!(
            build_number = %build.build_number,
            "build has no insertion artifact, skipping"
        );
    }

    Err(BuildRelayError::not_found(format!(
        "no insertable build for {}",
        query.context()
    )))
}

/// Return the completed build whose number matches `number` exactly.
///
/// Candidates are restricted to numbers that round-trip through
/// [`BuildNumber`] parse/display, so oddly formatted historical numbers never
/// collide with a dated lookup. Duplicates (not normally possible) are
/// resolved by finish time descending.
pub async fn build_by_number(
    service: &dyn BuildService,
    query: &BuildQuery<'_>,
    number: &str,
) -> Result<BuildCandidate> {
    let wanted: BuildNumber = number.parse().map_err(|e: String| {
        BuildRelayError::not_found(format!("invalid build number for {}: {e}", query.context()))
    })?;

    let candidates = fetch_candidates(service, query).await?;

    candidates
        .into_iter()
        .find(|b| {
            round_trips(&b.build_number)
                && b.build_number.parse::<BuildNumber>().ok() == Some(wanted)
        })
        .ok_or_else(|| {
            BuildRelayError::not_found(format!(
                "build {number} not found for {}",
                query.context()
            ))
        })
}

/// Fetch builds under both branch ref forms, union by id, and order by
/// finish time descending (stable).
async fn fetch_candidates(
    service: &dyn BuildService,
    query: &BuildQuery<'_>,
) -> Result<Vec<BuildCandidate>> {
    let full_ref = format!("refs/heads/{}", query.branch);

    let mut candidates = Vec::new();
    for branch in [full_ref.as_str(), query.branch] {
        let builds = service
            .list_builds(query.project, query.queue, branch, query.result_filter)
            .await
            .map_err(|e| {
                BuildRelayError::Network(format!(
                    "failed to list builds for {}: {e}",
                    query.context()
                ))
            })?;
        for build in builds {
            if !candidates.iter().any(|b: &BuildCandidate| b.id == build.id) {
                candidates.push(build);
            }
        }
    }

    candidates.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
    Ok(candidates)
}

/// Whether the build publishes the modern artifact or the legacy artifact
/// named after its build number.
async fn has_insertion_artifact(
    service: &dyn BuildService,
    query: &BuildQuery<'_>,
    build: &BuildCandidate,
) -> Result<bool> {
    let artifacts = service
        .list_artifacts(query.project, build.id)
        .await
        .map_err(|e| {
            BuildRelayError::Network(format!(
                "failed to list artifacts of build {} for {}: {e}",
                build.build_number,
                query.context()
            ))
        })?;

    Ok(artifacts
        .iter()
        .any(|a| a.name == query.modern_artifact_name || a.name == build.build_number))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use buildrelay_shared::types::{
        ArtifactDescriptor, BuildLogRef, RepositoryRef,
    };

    use super::*;

    /// In-memory build service fake: builds keyed by the exact branch string
    /// they were recorded under, artifacts keyed by build id.
    #[derive(Default)]
    struct FakeBuildService {
        builds: HashMap<String, Vec<BuildCandidate>>,
        artifacts: HashMap<u64, Vec<ArtifactDescriptor>>,
        list_calls: Mutex<Vec<String>>,
        fail_listing: bool,
    }

    impl FakeBuildService {
        fn add_build(&mut self, branch: &str, build: BuildCandidate) {
            self.builds
                .entry(branch.to_string())
                .or_default()
                .push(build);
        }

        fn add_artifact(&mut self, build_id: u64, name: &str) {
            self.artifacts.entry(build_id).or_default().push(ArtifactDescriptor {
                name: name.into(),
                resource_kind: "container".into(),
                locator: format!("#/{build_id}"),
                download_url: None,
            });
        }
    }

    #[async_trait]
    impl BuildService for FakeBuildService {
        async fn list_builds(
            &self,
            _project: &str,
            _queue: &str,
            branch: &str,
            _result_filter: Option<BuildOutcome>,
        ) -> Result<Vec<BuildCandidate>> {
            if self.fail_listing {
                return Err(BuildRelayError::Network("503 from build service".into()));
            }
            self.list_calls.lock().unwrap().push(branch.to_string());
            Ok(self.builds.get(branch).cloned().unwrap_or_default())
        }

        async fn list_artifacts(
            &self,
            _project: &str,
            build_id: u64,
        ) -> Result<Vec<ArtifactDescriptor>> {
            Ok(self.artifacts.get(&build_id).cloned().unwrap_or_default())
        }

        async fn list_logs(&self, _project: &str, _build_id: u64) -> Result<Vec<BuildLogRef>> {
            Ok(vec![])
        }

        async fn get_log_lines(
            &self,
            _project: &str,
            _build_id: u64,
            _log_id: u32,
            _start_line: u64,
            _end_line: u64,
        ) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn get_log_full_text(
            &self,
            _project: &str,
            _build_id: u64,
            _log_id: u32,
        ) -> Result<String> {
            Ok(String::new())
        }

        async fn get_artifact_archive(
            &self,
            _project: &str,
            _build_id: u64,
            _artifact_name: &str,
        ) -> Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    fn build(id: u64, number: &str, age_minutes: i64, tags: Vec<String>) -> BuildCandidate {
        BuildCandidate {
            id,
            project: "components".into(),
            build_number: number.into(),
            branch: "refs/heads/main".into(),
            finished_at: Utc::now() - Duration::minutes(age_minutes),
            result: BuildOutcome::Succeeded,
            tags,
            repository: RepositoryRef {
                kind: "GitHub".into(),
                id: "example/editor".into(),
                source_revision: Some(format!("sha{id}")),
            },
            web_url: format!("https://build.example.com/builds/{id}"),
        }
    }

    fn query<'a>() -> BuildQuery<'a> {
        BuildQuery {
            project: "components",
            queue: "component-ci",
            branch: "main",
            result_filter: None,
            modern_artifact_name: "ComponentArtifacts",
        }
    }

    #[tokio::test]
    async fn picks_most_recent_insertable() {
        let mut svc = FakeBuildService::default();
        svc.add_build("refs/heads/main", build(1, "20260314.1", 120, vec![]));
        svc.add_build("refs/heads/main", build(2, "20260315.1", 10, vec![]));
        svc.add_artifact(1, "ComponentArtifacts");
        svc.add_artifact(2, "ComponentArtifacts");

        let selected = latest_insertable(&svc, &query()).await.unwrap();
        assert_eq!(selected.id, 2);
    }

    #[tokio::test]
    async fn never_returns_opted_out_build() {
        let mut svc = FakeBuildService::default();
        svc.add_build(
            "refs/heads/main",
            build(1, "20260315.1", 10, vec!["DoesNotRequireInsertion_main".into()]),
        );
        svc.add_build("refs/heads/main", build(2, "20260314.1", 120, vec![]));
        svc.add_artifact(1, "ComponentArtifacts");
        svc.add_artifact(2, "ComponentArtifacts");

        let selected = latest_insertable(&svc, &query()).await.unwrap();
        assert_eq!(selected.id, 2, "newer build is tagged out, older wins");
    }

    #[tokio::test]
    async fn requires_modern_or_legacy_artifact() {
        let mut svc = FakeBuildService::default();
        svc.add_build("refs/heads/main", build(1, "20260315.1", 10, vec![]));
        svc.add_build("refs/heads/main", build(2, "20260314.1", 120, vec![]));
        // Build 1 publishes something unrelated; build 2 uses the legacy
        // build-number artifact name.
        svc.add_artifact(1, "TestLogs");
        svc.add_artifact(2, "20260314.1");

        let selected = latest_insertable(&svc, &query()).await.unwrap();
        assert_eq!(selected.id, 2);
    }

    #[tokio::test]
    async fn unions_both_branch_ref_forms() {
        let mut svc = FakeBuildService::default();
        // Historical build recorded under the bare branch name only.
        svc.add_build("main", build(7, "20260315.3", 5, vec![]));
        svc.add_artifact(7, "ComponentArtifacts");

        let selected = latest_insertable(&svc, &query()).await.unwrap();
        assert_eq!(selected.id, 7);

        let calls = svc.list_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["refs/heads/main".to_string(), "main".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_ids_across_ref_forms_collapse() {
        let mut svc = FakeBuildService::default();
        svc.add_build("refs/heads/main", build(5, "20260315.1", 10, vec![]));
        svc.add_build("main", build(5, "20260315.1", 10, vec![]));
        svc.add_artifact(5, "ComponentArtifacts");

        let selected = latest_insertable(&svc, &query()).await.unwrap();
        assert_eq!(selected.id, 5);
    }

    #[tokio::test]
    async fn no_insertable_build_is_not_found() {
        let svc = FakeBuildService::default();
        let err = latest_insertable(&svc, &query()).await.unwrap_err();
        match err {
            BuildRelayError::NotFound { message } => {
                assert!(message.contains("component-ci"));
                assert!(message.contains("components"));
                assert!(message.contains("main"));
            }
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn listing_failure_is_wrapped_with_context() {
        let svc = FakeBuildService {
            fail_listing: true,
            ..Default::default()
        };
        let err = latest_insertable(&svc, &query()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("component-ci"));
        assert!(msg.contains("503"));
    }

    #[tokio::test]
    async fn exact_lookup_matches_roundtripping_numbers_only() {
        let mut svc = FakeBuildService::default();
        svc.add_build("refs/heads/main", build(1, "20260315.1", 10, vec![]));
        // A number that does not round-trip through BuildNumber.
        svc.add_build("refs/heads/main", build(2, "manual-rebuild", 5, vec![]));

        let found = build_by_number(&svc, &query(), "20260315.1").await.unwrap();
        assert_eq!(found.id, 1);

        let err = build_by_number(&svc, &query(), "manual-rebuild")
            .await
            .unwrap_err();
        assert!(matches!(err, BuildRelayError::NotFound { .. }));
    }
}
