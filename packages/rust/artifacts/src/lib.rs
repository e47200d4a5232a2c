//! Artifact resolution: turn an insertable build into a local root directory.
//!
//! Resolution prefers, in order: a pre-resolved local directory (offline and
//! test runs), a directly addressable drop path for legacy artifacts, and
//! finally downloading the container artifact and extracting it into a
//! deterministic scratch directory.

pub mod scratch;

use std::io::Cursor;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::service::BuildService;
use buildrelay_shared::types::{ArtifactDescriptor, BuildCandidate, InsertionArtifacts};

pub use scratch::{DELETE_POLL, DELETE_WAIT, ScratchDir};

// ---------------------------------------------------------------------------
// ResolveOptions
// ---------------------------------------------------------------------------

/// Parameters for one resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Project owning the build.
    pub project: String,
    /// Insertion name, part of the scratch directory name.
    pub insertion_name: String,
    /// Target branch, part of the scratch directory name.
    pub branch: String,
    /// Fixed name of the modern container artifact.
    pub modern_artifact_name: String,
    /// Pre-resolved local directory; bypasses all network resolution.
    pub local_override: Option<PathBuf>,
    /// Root under which scratch directories are created.
    pub scratch_root: PathBuf,
}

impl ResolveOptions {
    /// Options with the platform temp dir as scratch root.
    pub fn new(
        project: impl Into<String>,
        insertion_name: impl Into<String>,
        branch: impl Into<String>,
        modern_artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            insertion_name: insertion_name.into(),
            branch: branch.into(),
            modern_artifact_name: modern_artifact_name.into(),
            local_override: None,
            scratch_root: std::env::temp_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactResolver
// ---------------------------------------------------------------------------

/// Resolves one insertable build to a local [`InsertionArtifacts`] value.
pub struct ArtifactResolver<'a> {
    service: &'a dyn BuildService,
    options: ResolveOptions,
}

impl<'a> ArtifactResolver<'a> {
    pub fn new(service: &'a dyn BuildService, options: ResolveOptions) -> Self {
        Self { service, options }
    }

    /// Resolve `build` to a local root directory.
    ///
    /// The cancellation token is checked before each expensive call; partial
    /// disk state left behind by a cancelled run is replaced on the next
    /// attempt.
    pub async fn resolve(
        &self,
        build: &BuildCandidate,
        cancel: &CancellationToken,
    ) -> Result<InsertionArtifacts> {
        if let Some(dir) = &self.options.local_override {
            info!(path = %dir.display(), "using pre-resolved local artifacts");
            return Ok(InsertionArtifacts::Legacy { root: dir.clone() });
        }

        if cancel.is_cancelled() {
            return Err(BuildRelayError::Cancelled);
        }

        let artifacts = self
            .service
            .list_artifacts(&self.options.project, build.id)
            .await?;

        let legacy_name = build.build_number.as_str();
        let matched = artifacts
            .iter()
            .find(|a| a.name == self.options.modern_artifact_name || a.name == legacy_name)
            .ok_or_else(|| {
                // Selection is expected to have validated artifact presence.
                BuildRelayError::not_found(format!(
                    "build {} has neither artifact '{}' nor '{}'",
                    build.build_number, self.options.modern_artifact_name, legacy_name
                ))
            })?;

        if !matched.is_container() && matched.name == legacy_name {
            // Drop-share convention: the published path plus the build number.
            let root = PathBuf::from(&matched.locator).join(&build.build_number);
            debug!(root = %root.display(), "composed legacy drop path, no download");
            return Ok(InsertionArtifacts::Legacy { root });
        }

        self.download_and_extract(build, matched, cancel).await
    }

    /// Download the container artifact and extract it into the scratch
    /// directory for this insertion-name/branch pair.
    async fn download_and_extract(
        &self,
        build: &BuildCandidate,
        artifact: &ArtifactDescriptor,
        cancel: &CancellationToken,
    ) -> Result<InsertionArtifacts> {
        if cancel.is_cancelled() {
            return Err(BuildRelayError::Cancelled);
        }

        let bytes = self
            .service
            .get_artifact_archive(&self.options.project, build.id, &artifact.name)
            .await?;

        let scratch = ScratchDir::prepare(
            &self.options.scratch_root,
            &self.options.insertion_name,
            &self.options.branch,
        )
        .await?;

        info!(
            artifact = %artifact.name,
            bytes = bytes.len(),
            dest = %scratch.path().display(),
            "extracting artifact archive"
        );
        extract_archive(&bytes, &scratch)?;

        let root = scratch.into_path();
        if artifact.name == self.options.modern_artifact_name {
            Ok(InsertionArtifacts::Modern { root })
        } else {
            Ok(InsertionArtifacts::Legacy { root })
        }
    }
}

/// Extract a zip archive held in memory into `dest`. Extraction is
/// all-or-nothing from the library's perspective; failures propagate.
fn extract_archive(bytes: &[u8], dest: &ScratchDir) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BuildRelayError::Archive(format!("failed to open archive: {e}")))?;
    archive
        .extract(dest.path())
        .map_err(|e| BuildRelayError::Archive(format!("failed to extract archive: {e}")))
}
