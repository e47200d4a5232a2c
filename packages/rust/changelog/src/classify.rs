//! Commit classification for changelog rendering.
//!
//! Commits arrive newest-first. Once any pull-request merge or squash commit
//! is recognized (the merge boundary), older commits that are not themselves
//! PR-classified are noise: downstream history only arrives by merge or
//! squash past that point.

use std::sync::LazyLock;

use regex::Regex;

use buildrelay_shared::config::ChangelogConfig;
use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::types::CommitRecord;

/// Matches `Merge pull request #N from ...` at message start.
static MERGE_PR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge pull request #(\d+) from ").expect("merge PR regex")
});

/// Matches a trailing `(#N)` squash marker on the first message line.
static SQUASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)\s*$").expect("squash regex"));

// ---------------------------------------------------------------------------
// ChangelogPolicy
// ---------------------------------------------------------------------------

/// Hosting-platform conventions the classifier depends on.
///
/// These encode domain policy of the originating platform, so they are
/// configuration rather than hardcoded rules.
#[derive(Debug, Clone)]
pub struct ChangelogPolicy {
    /// Committer identity the platform stamps on web merges.
    pub platform_committer: String,
    /// Author identity of the automated dependency-update bot.
    pub dependency_bot_author: String,
    /// Pattern matching automated release-flow merge messages, anchored at
    /// message start by the pattern itself.
    pub release_flow: Regex,
}

impl ChangelogPolicy {
    pub fn new(
        platform_committer: impl Into<String>,
        dependency_bot_author: impl Into<String>,
        release_flow_pattern: &str,
    ) -> Result<Self> {
        let release_flow = Regex::new(release_flow_pattern).map_err(|e| {
            BuildRelayError::config(format!("invalid release-flow pattern: {e}"))
        })?;
        Ok(Self {
            platform_committer: platform_committer.into(),
            dependency_bot_author: dependency_bot_author.into(),
            release_flow,
        })
    }

    pub fn from_config(config: &ChangelogConfig) -> Result<Self> {
        Self::new(
            &config.platform_committer,
            &config.dependency_bot_author,
            &config.release_flow_pattern,
        )
    }
}

impl Default for ChangelogPolicy {
    fn default() -> Self {
        Self::from_config(&ChangelogConfig::default()).expect("default policy")
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How one commit renders, if at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitClass {
    /// A `Merge pull request #N` commit.
    MergePr { number: u64, summary: String },
    /// A squash commit with a trailing `(#N)` marker.
    SquashPr { number: u64, summary: String },
    /// A commit with no PR marker.
    Plain { summary: String },
    /// Noise; not rendered.
    Skip,
}

/// Stateful classifier: tracks the merge boundary across a commit list.
#[derive(Debug)]
pub struct Classifier {
    policy: ChangelogPolicy,
    boundary_found: bool,
}

impl Classifier {
    pub fn new(policy: ChangelogPolicy) -> Self {
        Self {
            policy,
            boundary_found: false,
        }
    }

    /// Classify the next commit in newest-first order.
    pub fn classify(&mut self, commit: &CommitRecord) -> CommitClass {
        // Past the boundary, only platform-committed history is considered;
        // anything else arrived before the merge/squash that superseded it.
        if commit.committer != self.policy.platform_committer && self.boundary_found {
            return CommitClass::Skip;
        }
        if commit.author == self.policy.dependency_bot_author {
            return CommitClass::Skip;
        }
        if self.policy.release_flow.is_match(&commit.message) {
            return CommitClass::Skip;
        }

        if let Some(caps) = MERGE_PR_RE.captures(&commit.message) {
            self.boundary_found = true;
            let number: u64 = caps[1].parse().unwrap_or(0);
            // Merge commits carry the PR title on the third line when present.
            let summary = commit
                .message
                .lines()
                .nth(2)
                .filter(|l| !l.trim().is_empty())
                .or_else(|| commit.message.lines().next())
                .unwrap_or_default()
                .trim()
                .to_string();
            return CommitClass::MergePr { number, summary };
        }

        let first_line = commit.message.lines().next().unwrap_or_default();
        if let Some(caps) = SQUASH_RE.captures(first_line) {
            self.boundary_found = true;
            let number: u64 = caps[1].parse().unwrap_or(0);
            let summary = SQUASH_RE.replace(first_line, "").trim().to_string();
            return CommitClass::SquashPr { number, summary };
        }

        if self.boundary_found {
            return CommitClass::Skip;
        }

        CommitClass::Plain {
            summary: first_line.trim().to_string(),
        }
    }

    /// Whether a PR boundary has been recognized so far.
    pub fn boundary_found(&self) -> bool {
        self.boundary_found
    }
}
