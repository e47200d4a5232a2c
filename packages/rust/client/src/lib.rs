//! REST clients for the collaborator services.
//!
//! [`RestBuildService`] speaks the build service's JSON surface;
//! [`GitHubCommitFeed`] speaks the GitHub compare API;
//! [`RestPullRequestHost`] covers pull-request upsert and policy
//! evaluations on the downstream host. All three are thin mappings onto the
//! traits in `buildrelay-shared::service`; transport retry policy is out of
//! scope.

mod dto;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::service::{BuildService, CommitFeed, PolicyHost, PullRequestHost};
use buildrelay_shared::types::{
    ArtifactDescriptor, BuildCandidate, BuildLogRef, BuildOutcome, CommitRecord, PolicyEvaluation,
    PullRequestSpec, RepositoryRef,
};

use dto::{
    ArtifactDto, BuildDto, CompareDto, ListEnvelope, LogDto, PolicyEvaluationDto, PullRequestDto,
};

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("BuildRelay/", env!("CARGO_PKG_VERSION"));

/// Default GitHub API base.
const GITHUB_API_BASE: &str = "https://api.github.com";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| BuildRelayError::Network(format!("failed to build HTTP client: {e}")))
}

fn parse_base(base_url: &str) -> Result<Url> {
    Url::parse(base_url)
        .map_err(|e| BuildRelayError::config(format!("invalid base URL '{base_url}': {e}")))
}

fn check_status(url: &Url, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(BuildRelayError::not_found(format!("{url}: HTTP 404")));
    }
    if !status.is_success() {
        return Err(BuildRelayError::Network(format!("{url}: HTTP {status}")));
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// RestBuildService
// ---------------------------------------------------------------------------

/// Build listing, artifact, and log access over the build service REST API.
pub struct RestBuildService {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl RestBuildService {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BuildRelayError::config("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!(%url, "GET");
        let response = self
            .authed(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;
        check_status(&url, response)
    }
}

#[async_trait]
impl BuildService for RestBuildService {
    #[instrument(skip(self))]
    async fn list_builds(
        &self,
        project: &str,
        queue: &str,
        branch: &str,
        result_filter: Option<BuildOutcome>,
    ) -> Result<Vec<BuildCandidate>> {
        let mut url = self.url(&[project, "builds"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("definition", queue);
            query.append_pair("branch", branch);
            query.append_pair("status", "completed");
            if let Some(result) = result_filter {
                query.append_pair("result", &result.to_string());
            }
        }

        let envelope: ListEnvelope<BuildDto> = self
            .get(url.clone())
            .await?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;

        Ok(envelope
            .value
            .into_iter()
            .map(|b| b.into_candidate(project))
            .collect())
    }

    async fn list_artifacts(
        &self,
        project: &str,
        build_id: u64,
    ) -> Result<Vec<ArtifactDescriptor>> {
        let url = self.url(&[project, "builds", &build_id.to_string(), "artifacts"])?;
        let envelope: ListEnvelope<ArtifactDto> = self
            .get(url.clone())
            .await?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;
        Ok(envelope.value.into_iter().map(Into::into).collect())
    }

    async fn list_logs(&self, project: &str, build_id: u64) -> Result<Vec<BuildLogRef>> {
        let url = self.url(&[project, "builds", &build_id.to_string(), "logs"])?;
        let envelope: ListEnvelope<LogDto> = self
            .get(url.clone())
            .await?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;
        Ok(envelope.value.into_iter().map(Into::into).collect())
    }

    async fn get_log_lines(
        &self,
        project: &str,
        build_id: u64,
        log_id: u32,
        start_line: u64,
        end_line: u64,
    ) -> Result<Vec<String>> {
        let mut url = self.url(&[
            project,
            "builds",
            &build_id.to_string(),
            "logs",
            &log_id.to_string(),
        ])?;
        url.query_pairs_mut()
            .append_pair("startLine", &start_line.to_string())
            .append_pair("endLine", &end_line.to_string());

        let envelope: ListEnvelope<String> = self
            .get(url.clone())
            .await?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;
        Ok(envelope.value)
    }

    async fn get_log_full_text(
        &self,
        project: &str,
        build_id: u64,
        log_id: u32,
    ) -> Result<String> {
        let url = self.url(&[
            project,
            "builds",
            &build_id.to_string(),
            "logs",
            &log_id.to_string(),
            "text",
        ])?;
        self.get(url.clone())
            .await?
            .text()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: body read failed: {e}")))
    }

    async fn get_artifact_archive(
        &self,
        project: &str,
        build_id: u64,
        artifact_name: &str,
    ) -> Result<Vec<u8>> {
        let url = self.url(&[
            project,
            "builds",
            &build_id.to_string(),
            "artifacts",
            artifact_name,
            "content",
        ])?;
        let bytes = self
            .get(url.clone())
            .await?
            .bytes()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// GitHubCommitFeed
// ---------------------------------------------------------------------------

/// Commit diffs via the GitHub compare API.
pub struct GitHubCommitFeed {
    client: Client,
    api_base: Url,
    token: Option<String>,
}

impl GitHubCommitFeed {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
        Self::with_api_base(GITHUB_API_BASE, token, timeout)
    }

    /// Use a non-default API base (tests, GitHub Enterprise).
    pub fn with_api_base(
        api_base: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_base: parse_base(api_base)?,
            token,
        })
    }
}

#[async_trait]
impl CommitFeed for GitHubCommitFeed {
    #[instrument(skip(self, repo), fields(repo = %repo.id))]
    async fn commits_between(
        &self,
        repo: &RepositoryRef,
        from_sha: &str,
        to_sha: &str,
    ) -> Result<Vec<CommitRecord>> {
        if !repo.is_github() {
            return Err(BuildRelayError::Unsupported(format!(
                "commit diff requires a GitHub-backed repository, got '{}'",
                repo.kind
            )));
        }

        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| BuildRelayError::config("API base cannot be a base".to_string()))?
            .pop_if_empty()
            .push("repos")
            .extend(repo.id.split('/'))
            .push("compare")
            .push(&format!("{from_sha}...{to_sha}"));

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;
        let compare: CompareDto = check_status(&url, response)?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;

        // The compare API lists commits oldest first; the changelog needs
        // newest first.
        let mut commits: Vec<CommitRecord> =
            compare.commits.into_iter().map(Into::into).collect();
        commits.reverse();
        Ok(commits)
    }
}

// ---------------------------------------------------------------------------
// RestPullRequestHost
// ---------------------------------------------------------------------------

/// Pull-request and policy-evaluation surface of the downstream host.
pub struct RestPullRequestHost {
    client: Client,
    base_url: Url,
    project: String,
    token: Option<String>,
}

impl RestPullRequestHost {
    pub fn new(
        base_url: &str,
        project: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: parse_base(base_url)?,
            project: project.into(),
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BuildRelayError::config("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&self.project)
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl PullRequestHost for RestPullRequestHost {
    async fn upsert_pull_request(&self, spec: &PullRequestSpec) -> Result<u64> {
        let url = self.url(&["pullrequests"])?;
        let body = serde_json::json!({
            "title": spec.title,
            "description": spec.description,
            "sourceBranch": spec.source_branch,
            "targetBranch": spec.target_branch,
        });

        let response = self
            .authed(self.client.post(url.clone()).json(&body))
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;
        let pr: PullRequestDto = check_status(&url, response)?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;
        Ok(pr.id)
    }

    async fn set_auto_complete(&self, pull_request_id: u64) -> Result<()> {
        let url = self.url(&[
            "pullrequests",
            &pull_request_id.to_string(),
            "autocomplete",
        ])?;
        let response = self
            .authed(self.client.patch(url.clone()))
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;
        check_status(&url, response)?;
        Ok(())
    }
}

#[async_trait]
impl PolicyHost for RestPullRequestHost {
    async fn list_evaluations(&self, pull_request_id: u64) -> Result<Vec<PolicyEvaluation>> {
        let url = self.url(&[
            "pullrequests",
            &pull_request_id.to_string(),
            "policyevaluations",
        ])?;
        let response = self
            .authed(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;
        let envelope: ListEnvelope<PolicyEvaluationDto> = check_status(&url, response)?
            .json()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: decode failed: {e}")))?;
        Ok(envelope.value.into_iter().map(Into::into).collect())
    }

    async fn requeue(&self, pull_request_id: u64, evaluation_id: &str) -> Result<()> {
        let url = self.url(&[
            "pullrequests",
            &pull_request_id.to_string(),
            "policyevaluations",
            evaluation_id,
        ])?;
        let response = self
            .authed(self.client.patch(url.clone()))
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;
        check_status(&url, response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const BUILD_JSON: &str = r#"{
        "value": [{
            "id": 42,
            "buildNumber": "20260315.2",
            "sourceBranch": "refs/heads/main",
            "sourceVersion": "abc1234def",
            "finishTime": "2026-03-15T10:06:01Z",
            "result": "succeeded",
            "tags": ["Insertable"],
            "repository": { "type": "GitHub", "id": "example/editor" },
            "webUrl": "https://build.example.com/components/builds/42"
        }]
    }"#;

    #[tokio::test]
    async fn list_builds_maps_dto_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/components/builds"))
            .and(query_param("definition", "component-ci"))
            .and(query_param("branch", "refs/heads/main"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(BUILD_JSON, "application/json"),
            )
            .mount(&server)
            .await;

        let svc =
            RestBuildService::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let builds = svc
            .list_builds("components", "component-ci", "refs/heads/main", None)
            .await
            .unwrap();

        assert_eq!(builds.len(), 1);
        let build = &builds[0];
        assert_eq!(build.id, 42);
        assert_eq!(build.build_number, "20260315.2");
        assert_eq!(build.project, "components");
        assert_eq!(build.result, BuildOutcome::Succeeded);
        assert_eq!(build.repository.kind, "GitHub");
        assert_eq!(build.repository.source_revision.as_deref(), Some("abc1234def"));
    }

    #[tokio::test]
    async fn list_artifacts_maps_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/components/builds/42/artifacts"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"value":[{"name":"ComponentArtifacts","resource":{"type":"container","data":"#/42","downloadUrl":"https://build.example.com/dl/42"}}]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let svc =
            RestBuildService::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let artifacts = svc.list_artifacts("components", 42).await.unwrap();

        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].is_container());
        assert_eq!(artifacts[0].locator, "#/42");
    }

    #[tokio::test]
    async fn server_error_maps_to_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let svc =
            RestBuildService::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = svc.list_artifacts("components", 42).await.unwrap_err();
        assert!(matches!(err, BuildRelayError::Network(_)));
    }

    #[tokio::test]
    async fn compare_commits_are_reversed_to_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/example/editor/compare/aaa...bbb"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                    "commits": [
                        {"sha":"aaa1111","html_url":"https://github.com/example/editor/commit/aaa1111",
                         "commit":{"message":"older","author":{"name":"Jane"},"committer":{"name":"GitHub","date":"2026-03-14T08:00:00Z"}}},
                        {"sha":"bbb2222","html_url":"https://github.com/example/editor/commit/bbb2222",
                         "commit":{"message":"newer","author":{"name":"Jane"},"committer":{"name":"GitHub","date":"2026-03-15T08:00:00Z"}}}
                    ]
                }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let feed =
            GitHubCommitFeed::with_api_base(&server.uri(), None, Duration::from_secs(5))
                .unwrap();
        let repo = RepositoryRef {
            kind: "GitHub".into(),
            id: "example/editor".into(),
            source_revision: None,
        };
        let commits = feed.commits_between(&repo, "aaa", "bbb").await.unwrap();

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "newer");
        assert_eq!(commits[1].message, "older");
    }

    #[tokio::test]
    async fn non_github_repository_is_unsupported() {
        let feed = GitHubCommitFeed::new(None, Duration::from_secs(5)).unwrap();
        let repo = RepositoryRef {
            kind: "TfsGit".into(),
            id: "internal/editor".into(),
            source_revision: None,
        };
        let err = feed.commits_between(&repo, "aaa", "bbb").await.unwrap_err();
        assert!(matches!(err, BuildRelayError::Unsupported(_)));
    }

    #[tokio::test]
    async fn upsert_pull_request_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/downstream/pullrequests"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"id": 7001}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let host = RestPullRequestHost::new(
            &server.uri(),
            "downstream",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let id = host
            .upsert_pull_request(&PullRequestSpec {
                title: "Insert Component build 20260315.2".into(),
                description: "…".into(),
                source_branch: "insert/component/20260315.2".into(),
                target_branch: "main".into(),
            })
            .await
            .unwrap();
        assert_eq!(id, 7001);
    }
}
