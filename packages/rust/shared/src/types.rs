//! Core domain types for the insertion pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BuildRelayError, Result};

/// Artifact resource kind whose content must be downloaded from the build
/// service rather than read from a directly addressable path.
pub const CONTAINER_RESOURCE_KIND: &str = "container";

// ---------------------------------------------------------------------------
// BuildOutcome
// ---------------------------------------------------------------------------

/// Result status of a finished build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildOutcome {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Canceled,
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::PartiallySucceeded => "partiallySucceeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// RepositoryRef
// ---------------------------------------------------------------------------

/// Descriptor of the repository a build was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Hosting kind, e.g. `GitHub`.
    pub kind: String,
    /// Repository identifier in the host's own format (e.g. `owner/name`).
    pub id: String,
    /// Commit the build was produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
}

impl RepositoryRef {
    /// Whether this repository is hosted on GitHub (case-insensitive).
    pub fn is_github(&self) -> bool {
        self.kind.eq_ignore_ascii_case("github")
    }
}

// ---------------------------------------------------------------------------
// BuildCandidate
// ---------------------------------------------------------------------------

/// A candidate upstream build, immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCandidate {
    /// Build service identifier.
    pub id: u64,
    /// Owning project.
    pub project: String,
    /// Human-facing build number, e.g. `20260315.2`.
    pub build_number: String,
    /// Branch reference as recorded by the build service. Historical builds
    /// may carry either `refs/heads/<branch>` or the bare `<branch>` form.
    pub branch: String,
    /// When the build finished.
    pub finished_at: DateTime<Utc>,
    /// Result status.
    pub result: BuildOutcome,
    /// Free-text tags attached to the build.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source repository descriptor.
    pub repository: RepositoryRef,
    /// Web URL of the build page.
    pub web_url: String,
}

impl BuildCandidate {
    /// The opt-out tag that excludes a build from insertion into `branch`.
    pub fn opt_out_tag(branch: &str) -> String {
        format!("DoesNotRequireInsertion_{branch}")
    }

    /// Whether this build carries the opt-out tag for `branch`.
    pub fn opted_out_of(&self, branch: &str) -> bool {
        let tag = Self::opt_out_tag(branch);
        self.tags.iter().any(|t| t == &tag)
    }
}

// ---------------------------------------------------------------------------
// ArtifactDescriptor
// ---------------------------------------------------------------------------

/// A published artifact attached to a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Artifact name as published.
    pub name: String,
    /// Resource kind; [`CONTAINER_RESOURCE_KIND`] means the content must be
    /// downloaded, anything else exposes a directly addressable path.
    pub resource_kind: String,
    /// Filesystem path template for directly addressable artifacts, or an
    /// opaque content reference for containers.
    pub locator: String,
    /// Direct download URL when the service provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ArtifactDescriptor {
    /// Whether the content must be pulled from the build service.
    pub fn is_container(&self) -> bool {
        self.resource_kind
            .eq_ignore_ascii_case(CONTAINER_RESOURCE_KIND)
    }
}

// ---------------------------------------------------------------------------
// InsertionArtifacts
// ---------------------------------------------------------------------------

/// Resolved local artifacts for one insertable build.
///
/// Exactly one variant is produced per build. Both variants expose the same
/// capability to downstream consumers: a root directory. Values are resolved
/// fresh per insertion attempt and never cached across attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionArtifacts {
    /// Root directory composed from the drop-share convention, or a
    /// downloaded and extracted legacy artifact.
    Legacy { root: PathBuf },
    /// Root directory extracted from the single modern container artifact.
    Modern { root: PathBuf },
}

impl InsertionArtifacts {
    /// The root directory containing the build's artifacts.
    pub fn root(&self) -> &Path {
        match self {
            Self::Legacy { root } | Self::Modern { root } => root,
        }
    }

    /// Check that the root directory exists and is non-empty. Callers must
    /// not assume existence without this check having passed.
    pub fn validate(&self) -> Result<()> {
        let root = self.root();
        if !root.is_dir() {
            return Err(BuildRelayError::not_found(format!(
                "artifact root {} does not exist or is not a directory",
                root.display()
            )));
        }
        let mut entries =
            std::fs::read_dir(root).map_err(|e| BuildRelayError::io(root, e))?;
        if entries.next().is_none() {
            return Err(BuildRelayError::not_found(format!(
                "artifact root {} is empty",
                root.display()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// One component described by a build manifest.
///
/// Produced in manifest-URL discovery order; duplicates by name are passed
/// through, not deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Component name (manifest file name without its extension).
    pub name: String,
    /// Manifest file name, e.g. `Editor.Core.manifest`.
    pub file_name: String,
    /// Full manifest URL as announced in the build log.
    pub manifest_url: String,
    /// Resolved version string; manifests may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// CommitRecord
// ---------------------------------------------------------------------------

/// One commit between two builds, as delivered by the diff source.
///
/// The newest-first ordering is load-bearing for changelog rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Author name.
    pub author: String,
    /// Committer name.
    pub committer: String,
    /// Commit timestamp.
    pub committed_at: DateTime<Utc>,
    /// Full commit message.
    pub message: String,
    /// Commit id (SHA).
    pub sha: String,
    /// Web URL of the commit.
    pub web_url: String,
}

// ---------------------------------------------------------------------------
// Supporting types for collaborator services
// ---------------------------------------------------------------------------

/// Reference to one log of a build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildLogRef {
    pub id: u32,
    pub line_count: u64,
}

/// One policy evaluation attached to a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub evaluation_id: String,
    pub display_name: String,
    pub status: String,
}

/// What the pipeline asks the pull-request host to create or update.
#[derive(Debug, Clone)]
pub struct PullRequestSpec {
    pub title: String,
    pub description: String,
    pub source_branch: String,
    pub target_branch: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_out_tag_is_branch_keyed() {
        assert_eq!(
            BuildCandidate::opt_out_tag("release/2026"),
            "DoesNotRequireInsertion_release/2026"
        );
    }

    #[test]
    fn opted_out_requires_exact_match() {
        let build = sample_build(vec!["DoesNotRequireInsertion_main".into()]);
        assert!(build.opted_out_of("main"));
        assert!(!build.opted_out_of("release/2026"));
        // Prefix alone does not match
        let build = sample_build(vec!["DoesNotRequireInsertion_main_extra".into()]);
        assert!(!build.opted_out_of("main"));
    }

    #[test]
    fn container_kind_is_case_insensitive() {
        let artifact = ArtifactDescriptor {
            name: "ComponentArtifacts".into(),
            resource_kind: "Container".into(),
            locator: "#/12345".into(),
            download_url: None,
        };
        assert!(artifact.is_container());
    }

    #[test]
    fn artifacts_root_shared_across_variants() {
        let legacy = InsertionArtifacts::Legacy {
            root: PathBuf::from("/drops/build/20260315.2"),
        };
        let modern = InsertionArtifacts::Modern {
            root: PathBuf::from("/tmp/relay/extracted"),
        };
        assert_eq!(legacy.root(), Path::new("/drops/build/20260315.2"));
        assert_eq!(modern.root(), Path::new("/tmp/relay/extracted"));
    }

    #[test]
    fn validate_rejects_missing_and_empty_roots() {
        let missing = InsertionArtifacts::Modern {
            root: PathBuf::from("/definitely/not/a/real/path"),
        };
        assert!(missing.validate().is_err());

        let dir = tempfile::tempdir().expect("tempdir");
        let empty = InsertionArtifacts::Modern {
            root: dir.path().to_path_buf(),
        };
        assert!(empty.validate().is_err());

        std::fs::write(dir.path().join("payload.manifest"), "{}").expect("write");
        assert!(empty.validate().is_ok());
    }

    #[test]
    fn build_candidate_serialization_roundtrip() {
        let build = sample_build(vec!["Insertable".into()]);
        let json = serde_json::to_string(&build).expect("serialize");
        let parsed: BuildCandidate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.id, build.id);
        assert_eq!(parsed.build_number, build.build_number);
        assert_eq!(parsed.result, BuildOutcome::Succeeded);
    }

    fn sample_build(tags: Vec<String>) -> BuildCandidate {
        BuildCandidate {
            id: 42,
            project: "components".into(),
            build_number: "20260315.2".into(),
            branch: "refs/heads/main".into(),
            finished_at: Utc::now(),
            result: BuildOutcome::Succeeded,
            tags,
            repository: RepositoryRef {
                kind: "GitHub".into(),
                id: "example/editor".into(),
                source_revision: Some("abc1234def".into()),
            },
            web_url: "https://build.example.com/components/builds/42".into(),
        }
    }
}
