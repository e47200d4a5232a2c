//! Wire DTOs for the build service REST surface and the GitHub compare API.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use buildrelay_shared::types::{
    ArtifactDescriptor, BuildCandidate, BuildLogRef, BuildOutcome, CommitRecord, PolicyEvaluation,
    RepositoryRef,
};

/// Standard list envelope of the build service.
#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope<T> {
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuildDto {
    pub id: u64,
    pub build_number: String,
    pub source_branch: String,
    pub source_version: Option<String>,
    pub finish_time: DateTime<Utc>,
    pub result: BuildOutcome,
    #[serde(default)]
    pub tags: Vec<String>,
    pub repository: RepositoryDto,
    #[serde(default)]
    pub web_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl BuildDto {
    pub fn into_candidate(self, project: &str) -> BuildCandidate {
        BuildCandidate {
            id: self.id,
            project: project.to_string(),
            build_number: self.build_number,
            branch: self.source_branch,
            finished_at: self.finish_time,
            result: self.result,
            tags: self.tags,
            repository: RepositoryRef {
                kind: self.repository.kind,
                id: self.repository.id,
                source_revision: self.source_version,
            },
            web_url: self.web_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArtifactDto {
    pub name: String,
    pub resource: ResourceDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceDto {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: String,
    pub download_url: Option<String>,
}

impl From<ArtifactDto> for ArtifactDescriptor {
    fn from(dto: ArtifactDto) -> Self {
        Self {
            name: dto.name,
            resource_kind: dto.resource.kind,
            locator: dto.resource.data,
            download_url: dto.resource.download_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogDto {
    pub id: u32,
    #[serde(default)]
    pub line_count: u64,
}

impl From<LogDto> for BuildLogRef {
    fn from(dto: LogDto) -> Self {
        Self {
            id: dto.id,
            line_count: dto.line_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PolicyEvaluationDto {
    pub evaluation_id: String,
    pub display_name: String,
    #[serde(default)]
    pub status: String,
}

impl From<PolicyEvaluationDto> for PolicyEvaluation {
    fn from(dto: PolicyEvaluationDto) -> Self {
        Self {
            evaluation_id: dto.evaluation_id,
            display_name: dto.display_name,
            status: dto.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestDto {
    pub id: u64,
}

// ---------------------------------------------------------------------------
// GitHub compare API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct CompareDto {
    pub commits: Vec<GhCommitDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhCommitDto {
    pub sha: String,
    pub html_url: String,
    pub commit: GhCommitDetailDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhCommitDetailDto {
    pub message: String,
    pub author: GhIdentityDto,
    pub committer: GhIdentityDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GhIdentityDto {
    pub name: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl From<GhCommitDto> for CommitRecord {
    fn from(dto: GhCommitDto) -> Self {
        Self {
            author: dto.commit.author.name,
            committer: dto.commit.committer.name,
            committed_at: dto.commit.committer.date.unwrap_or_default(),
            message: dto.commit.message,
            sha: dto.sha,
            web_url: dto.html_url,
        }
    }
}
