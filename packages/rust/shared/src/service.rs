//! Collaborator service traits consumed by the insertion pipeline.
//!
//! These model external capabilities only: the build service's artifact and
//! log surface, the commit-diff source, the pull-request host, and its policy
//! evaluation surface. Concrete REST implementations live in
//! `buildrelay-client`; tests use in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    ArtifactDescriptor, BuildCandidate, BuildLogRef, BuildOutcome, CommitRecord, PolicyEvaluation,
    PullRequestSpec, RepositoryRef,
};

/// Build listing, artifact listing/content, and log access.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// List finished builds of `queue` on `branch`, optionally filtered by
    /// result. `branch` is passed exactly as given; callers wanting both ref
    /// forms must query twice.
    async fn list_builds(
        &self,
        project: &str,
        queue: &str,
        branch: &str,
        result_filter: Option<BuildOutcome>,
    ) -> Result<Vec<BuildCandidate>>;

    /// List artifacts published by a build.
    async fn list_artifacts(
        &self,
        project: &str,
        build_id: u64,
    ) -> Result<Vec<ArtifactDescriptor>>;

    /// List the logs of a build.
    async fn list_logs(&self, project: &str, build_id: u64) -> Result<Vec<BuildLogRef>>;

    /// Fetch a line range of one log (1-based, inclusive).
    async fn get_log_lines(
        &self,
        project: &str,
        build_id: u64,
        log_id: u32,
        start_line: u64,
        end_line: u64,
    ) -> Result<Vec<String>>;

    /// Fetch the full text of one log.
    async fn get_log_full_text(
        &self,
        project: &str,
        build_id: u64,
        log_id: u32,
    ) -> Result<String>;

    /// Download the full content of a container artifact as an archive.
    async fn get_artifact_archive(
        &self,
        project: &str,
        build_id: u64,
        artifact_name: &str,
    ) -> Result<Vec<u8>>;
}

/// Commit diff between two revisions of the upstream repository.
#[async_trait]
pub trait CommitFeed: Send + Sync {
    /// Commits reachable from `to_sha` but not `from_sha`, newest first.
    ///
    /// Returns [`crate::BuildRelayError::Unsupported`] when the repository is
    /// not hosted on a supported platform.
    async fn commits_between(
        &self,
        repo: &RepositoryRef,
        from_sha: &str,
        to_sha: &str,
    ) -> Result<Vec<CommitRecord>>;
}

/// Pull-request creation/update surface of the downstream host.
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// Create the insertion PR, or update the existing open one for the same
    /// source/target branch pair. Returns the PR id.
    async fn upsert_pull_request(&self, spec: &PullRequestSpec) -> Result<u64>;

    /// Enable auto-complete on the PR. Optional step; failures are reported
    /// to the caller who logs and continues.
    async fn set_auto_complete(&self, pull_request_id: u64) -> Result<()>;
}

/// Policy evaluation listing and requeue surface of the downstream host.
#[async_trait]
pub trait PolicyHost: Send + Sync {
    /// List current policy evaluations on a pull request.
    async fn list_evaluations(&self, pull_request_id: u64) -> Result<Vec<PolicyEvaluation>>;

    /// Requeue one policy evaluation.
    async fn requeue(&self, pull_request_id: u64, evaluation_id: &str) -> Result<()>;
}
