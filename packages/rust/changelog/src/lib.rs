//! Size-bounded Markdown changelog compilation.
//!
//! Renders a newest-first commit list into two bucketed blocks (plain
//! commits since the last PR, then merged PRs) under a hard character
//! budget. Classification rules live in [`classify`].

pub mod classify;

use tracing::warn;

use buildrelay_shared::types::CommitRecord;

pub use classify::{ChangelogPolicy, Classifier, CommitClass};

/// Header for the plain-commit block, added once before its first bullet.
pub const COMMITS_HEADER: &str = "### Commits since last PR";

/// Header for the merged-PR block, added once before its first bullet.
pub const MERGED_PRS_HEADER: &str = "### Merged PRs";

/// Fixed notice appended when the budget cuts the list short.
pub const TRUNCATION_NOTICE: &str = "Changelog truncated to fit the description limit.";

const LINE_BREAK_LEN: usize = 1;

// ---------------------------------------------------------------------------
// ChangelogCompiler
// ---------------------------------------------------------------------------

/// Compiles commit lists into a bounded Markdown changelog.
#[derive(Debug, Clone)]
pub struct ChangelogCompiler {
    policy: ChangelogPolicy,
    /// Hard character budget for the rendered changelog.
    hard_limit: usize,
    /// Repository web URL used to construct `/pull/<N>` and `/commit/<sha>`
    /// links.
    repo_url: String,
}

/// The rendered changelog plus compilation stats.
#[derive(Debug, Clone)]
pub struct CompiledChangelog {
    pub text: String,
    pub truncated: bool,
    pub merged_pr_count: usize,
    pub commit_count: usize,
}

impl ChangelogCompiler {
    pub fn new(policy: ChangelogPolicy, hard_limit: usize, repo_url: impl Into<String>) -> Self {
        Self {
            policy,
            hard_limit,
            repo_url: repo_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Render `commits` (newest first) into a bounded Markdown changelog.
    pub fn compile(&self, commits: &[CommitRecord]) -> CompiledChangelog {
        let mut classifier = Classifier::new(self.policy.clone());

        let mut commit_lines: Vec<String> = Vec::new();
        let mut pr_lines: Vec<String> = Vec::new();
        let mut total = 0usize;
        let mut truncated = false;

        for commit in commits {
            let (line, is_pr) = match classifier.classify(commit) {
                CommitClass::Skip => continue,
                CommitClass::MergePr { number, summary }
                | CommitClass::SquashPr { number, summary } => (
                    format!(
                        "- [{}]({}/pull/{number})",
                        strip_self_reference(&summary, number),
                        self.repo_url
                    ),
                    true,
                ),
                CommitClass::Plain { summary } => {
                    let short_sha = commit.sha.get(..7).unwrap_or(&commit.sha);
                    (
                        format!(
                            "- [{summary} ({short_sha})]({}/commit/{})",
                            self.repo_url, commit.sha
                        ),
                        false,
                    )
                }
            };

            // Header cost counts against the same budget as its first line.
            let header_cost = if is_pr && pr_lines.is_empty() {
                MERGED_PRS_HEADER.len() + LINE_BREAK_LEN
            } else if !is_pr && commit_lines.is_empty() {
                COMMITS_HEADER.len() + LINE_BREAK_LEN
            } else {
                0
            };

            let needed = header_cost
                + line.len()
                + LINE_BREAK_LEN
                + TRUNCATION_NOTICE.len()
                + LINE_BREAK_LEN;
            if total > self.hard_limit.saturating_sub(needed) {
                truncated = true;
                break;
            }

            total += header_cost + line.len() + LINE_BREAK_LEN;
            if is_pr {
                pr_lines.push(line);
            } else {
                commit_lines.push(line);
            }
        }

        let text = assemble(&commit_lines, &pr_lines, truncated);

        if text.len() > self.hard_limit {
            warn!(
                length = text.len(),
                hard_limit = self.hard_limit,
                "changelog exceeds the description budget"
            );
        }

        CompiledChangelog {
            text,
            truncated,
            merged_pr_count: pr_lines.len(),
            commit_count: commit_lines.len(),
        }
    }
}

/// Emit the commit block, then the merged-PR block, then any truncation
/// notice.
fn assemble(commit_lines: &[String], pr_lines: &[String], truncated: bool) -> String {
    let mut out = String::new();

    if !commit_lines.is_empty() {
        out.push_str(COMMITS_HEADER);
        out.push('\n');
        for line in commit_lines {
            out.push_str(line);
            out.push('\n');
        }
    }

    if !pr_lines.is_empty() {
        out.push_str(MERGED_PRS_HEADER);
        out.push('\n');
        for line in pr_lines {
            out.push_str(line);
            out.push('\n');
        }
    }

    if truncated {
        out.push_str(TRUNCATION_NOTICE);
        out.push('\n');
    }

    out
}

/// Strip the `#` prefix from references to the PR's own number so the
/// hosting UI does not double-link them inside the bullet link text.
fn strip_self_reference(summary: &str, number: u64) -> String {
    summary.replace(&format!("#{number}"), &number.to_string())
}
