//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use buildrelay_client::{GitHubCommitFeed, RestBuildService, RestPullRequestHost};
use buildrelay_core::pipeline::{
    Collaborators, InsertionOptions, InsertionOutcome, ProgressReporter, run_insertion,
};
use buildrelay_selector::BuildQuery;
use buildrelay_shared::{AppConfig, init_config, load_config, validate_token};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// BuildRelay — promote upstream component builds into downstream repos.
#[derive(Parser)]
#[command(
    name = "buildrelay",
    version,
    about = "Select the latest insertable upstream build and open the downstream insertion PR.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one insertion attempt end to end.
    Insert {
        /// Build queue producing insertable builds (overrides config).
        #[arg(long)]
        queue: Option<String>,

        /// Downstream target branch (overrides config).
        #[arg(long)]
        branch: Option<String>,

        /// Project owning the upstream builds (overrides config).
        #[arg(long)]
        project: Option<String>,

        /// Build number of the previously inserted build; enables the
        /// commit-diff changelog.
        #[arg(long)]
        since: Option<String>,

        /// Pre-resolved local artifacts directory (skips all downloads).
        #[arg(long)]
        local_artifacts: Option<PathBuf>,

        /// Named build policy to requeue on the PR after update.
        #[arg(long)]
        requeue_policy: Option<String>,

        /// Enable auto-complete on the PR.
        #[arg(long)]
        auto_complete: bool,

        /// Compose everything but skip the pull-request update.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the build that would be inserted, without side effects.
    Check {
        /// Build queue producing insertable builds (overrides config).
        #[arg(long)]
        queue: Option<String>,

        /// Downstream target branch (overrides config).
        #[arg(long)]
        branch: Option<String>,
    },

    /// Requeue a named build policy on an existing pull request.
    Requeue {
        /// Pull request id.
        #[arg(long)]
        pr: u64,

        /// Policy display name (case-insensitive).
        #[arg(long)]
        policy: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "buildrelay=info",
        1 => "buildrelay=debug",
        _ => "buildrelay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Insert {
            queue,
            branch,
            project,
            since,
            local_artifacts,
            requeue_policy,
            auto_complete,
            dry_run,
        } => {
            cmd_insert(
                queue.as_deref(),
                branch.as_deref(),
                project.as_deref(),
                since,
                local_artifacts,
                requeue_policy,
                auto_complete,
                dry_run,
            )
            .await
        }
        Command::Check { queue, branch } => cmd_check(queue.as_deref(), branch.as_deref()).await,
        Command::Requeue { pr, policy } => cmd_requeue(pr, &policy).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Collaborator wiring
// ---------------------------------------------------------------------------

struct Services {
    builds: RestBuildService,
    commits: GitHubCommitFeed,
    pull_requests: RestPullRequestHost,
}

fn connect(config: &AppConfig) -> Result<Services> {
    let token = std::env::var(&config.service.token_env).ok();
    let timeout = Duration::from_secs(config.service.timeout_secs);

    Ok(Services {
        builds: RestBuildService::new(&config.service.base_url, token.clone(), timeout)?,
        commits: GitHubCommitFeed::new(token.clone(), timeout)?,
        pull_requests: RestPullRequestHost::new(
            &config.service.base_url,
            &config.insertion.project,
            token,
            timeout,
        )?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn cmd_insert(
    queue: Option<&str>,
    branch: Option<&str>,
    project: Option<&str>,
    since: Option<String>,
    local_artifacts: Option<PathBuf>,
    requeue_policy: Option<String>,
    auto_complete: bool,
    dry_run: bool,
) -> Result<()> {
    let config = load_config()?;
    if !dry_run {
        validate_token(&config)?;
    }

    let mut options = InsertionOptions::from_config(&config)?;
    if let Some(queue) = queue {
        options.queue = queue.to_string();
    }
    if let Some(branch) = branch {
        options.target_branch = branch.to_string();
    }
    if let Some(project) = project {
        options.project = project.to_string();
    }
    if local_artifacts.is_some() {
        options.local_artifacts_dir = local_artifacts;
    }
    options.previous_build_number = since;
    options.requeue_policy = requeue_policy;
    options.auto_complete = auto_complete;
    options.dry_run = dry_run;

    info!(
        queue = %options.queue,
        branch = %options.target_branch,
        dry_run,
        "starting insertion attempt"
    );

    let services = connect(&config)?;
    let ctx = Collaborators {
        builds: &services.builds,
        commits: &services.commits,
        pull_requests: &services.pull_requests,
        policies: &services.pull_requests,
    };

    // Ctrl-C requests cooperative cancellation; in-flight disk state is
    // replaced on the next attempt.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    let reporter = CliProgress::new();
    let outcome = run_insertion(&ctx, &options, &reporter, &cancel).await?;

    // Print summary
    println!();
    println!("  Insertion attempt complete!");
    println!("  Build:      {}", outcome.build.build_number);
    println!("  Components: {}", outcome.components.len());
    println!("  Merged PRs: {}", outcome.merged_pr_count);
    println!("  Commits:    {}", outcome.commit_count);
    match outcome.pull_request_id {
        Some(id) => println!("  PR:         #{id}"),
        None => println!("  PR:         skipped (dry run)"),
    }
    println!("  Time:       {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    if dry_run {
        println!("{}", outcome.description);
    }

    Ok(())
}

async fn cmd_check(queue: Option<&str>, branch: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let services = connect(&config)?;

    let queue = queue.unwrap_or(&config.insertion.queue);
    let branch = branch.unwrap_or(&config.insertion.target_branch);
    let query = BuildQuery {
        project: &config.insertion.project,
        queue,
        branch,
        result_filter: None,
        modern_artifact_name: &config.artifacts.modern_name,
    };

    let build = buildrelay_selector::latest_insertable(&services.builds, &query).await?;

    println!("  Insertable build found:");
    println!("  Number:   {}", build.build_number);
    println!("  Finished: {}", build.finished_at);
    println!("  Result:   {}", build.result);
    println!("  Source:   {}", build.repository.id);
    println!("  URL:      {}", build.web_url);

    Ok(())
}

async fn cmd_requeue(pr: u64, policy: &str) -> Result<()> {
    let config = load_config()?;
    validate_token(&config)?;
    let services = connect(&config)?;

    let timeout = Duration::from_secs(config.requeue.timeout_secs);
    buildrelay_core::requeue_policy(&services.pull_requests, pr, policy, timeout).await?;

    println!("Policy '{policy}' requeued on PR #{pr}.");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &InsertionOutcome) {
        self.spinner.finish_and_clear();
    }
}
