//! Deterministic scratch-directory lifecycle for extracted artifacts.
//!
//! The directory name is derived from the insertion name and branch, not a
//! unique run id, so repeated runs reuse and replace the same location. Two
//! concurrent attempts with identical parameters would race on
//! deletion/creation; that is an accepted limitation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use buildrelay_shared::error::{BuildRelayError, Result};

/// Upper bound on waiting for a deleted directory to disappear. On some
/// platforms recursive deletion is not synchronously observable, so creating
/// the directory again immediately can race with the pending delete.
/// Best-effort: on expiry we proceed anyway.
pub const DELETE_WAIT: Duration = Duration::from_secs(20);

/// Poll interval while waiting for the deletion to become observable.
pub const DELETE_POLL: Duration = Duration::from_millis(100);

/// A freshly (re)created scratch directory under the platform temp root.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// The deterministic path for an insertion-name/branch pair under `root`.
    pub fn path_for(root: &Path, insertion_name: &str, branch: &str) -> PathBuf {
        root.join(sanitize(&format!("{insertion_name}_{branch}")))
    }

    /// Delete any previous contents and recreate the directory empty.
    pub async fn prepare(root: &Path, insertion_name: &str, branch: &str) -> Result<Self> {
        let path = Self::path_for(root, insertion_name, branch);

        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                // Tolerated: stale contents will be overwritten by extraction.
                warn!(path = %path.display(), error = %e, "scratch cleanup failed, continuing");
            }
            wait_for_disappearance(&path).await;
        }

        std::fs::create_dir_all(&path).map_err(|e| BuildRelayError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// Poll until `path` no longer exists or [`DELETE_WAIT`] elapses.
async fn wait_for_disappearance(path: &Path) {
    let deadline = tokio::time::Instant::now() + DELETE_WAIT;
    while path.exists() {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                path = %path.display(),
                "scratch directory still present after delete wait, proceeding"
            );
            break;
        }
        tokio::time::sleep(DELETE_POLL).await;
    }
}

/// Replace spaces and path separators so the composite name is a single
/// directory component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_spaces_and_separators() {
        assert_eq!(
            sanitize("Component Insertion_release/2026"),
            "Component_Insertion_release_2026"
        );
        assert_eq!(sanitize(r"a\b c"), "a_b_c");
    }

    #[test]
    fn path_is_deterministic() {
        let root = Path::new("/tmp");
        let a = ScratchDir::path_for(root, "Component Insertion", "main");
        let b = ScratchDir::path_for(root, "Component Insertion", "main");
        assert_eq!(a, b);
        assert_eq!(a, Path::new("/tmp/Component_Insertion_main"));
    }

    #[tokio::test]
    async fn prepare_replaces_previous_contents() {
        let root = tempfile::tempdir().expect("tempdir");

        let scratch = ScratchDir::prepare(root.path(), "Insertion", "main")
            .await
            .unwrap();
        std::fs::write(scratch.path().join("stale.txt"), "old run").unwrap();

        let scratch = ScratchDir::prepare(root.path(), "Insertion", "main")
            .await
            .unwrap();
        assert!(scratch.path().is_dir());
        assert!(!scratch.path().join("stale.txt").exists());
    }
}
