//! Component version resolution from build manifests.
//!
//! The build log announces one manifest URL per published component. Each
//! URL resolves to a [`Component`] whose version comes from the manifest's
//! `info.buildVersion` field. A local copy under the resolved artifact root
//! is preferred over fetching the manifest from the network.

mod parser;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::service::BuildService;
use buildrelay_shared::types::Component;

pub use parser::ManifestLocator;

/// User-Agent string for manifest fetches.
const USER_AGENT: &str = concat!("BuildRelay/", env!("CARGO_PKG_VERSION"));

/// How many lines of each log to peek when locating the manifest block,
/// before committing to a full-text download.
pub const LOG_PEEK_LINES: u64 = 200;

// ---------------------------------------------------------------------------
// ManifestResolver
// ---------------------------------------------------------------------------

/// Resolves a build's manifest URLs into components with versions.
pub struct ManifestResolver<'a> {
    service: &'a dyn BuildService,
    http: reqwest::Client,
    locator: ManifestLocator,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(service: &'a dyn BuildService, locator: ManifestLocator) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BuildRelayError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            service,
            http,
            locator,
        })
    }

    /// Resolve all components announced by `build_id`'s log.
    ///
    /// `artifact_root`, when present, is searched recursively for local
    /// manifest copies before any network fetch.
    pub async fn components_for_build(
        &self,
        project: &str,
        build_id: u64,
        artifact_root: Option<&Path>,
    ) -> Result<Vec<Component>> {
        let log_text = self.locate_manifest_log(project, build_id).await?;
        self.components_from_log(&log_text, artifact_root).await
    }

    /// Resolve components from already-fetched log text.
    pub async fn components_from_log(
        &self,
        log_text: &str,
        artifact_root: Option<&Path>,
    ) -> Result<Vec<Component>> {
        let urls = self.locator.manifest_urls(log_text)?;
        info!(count = urls.len(), "resolving components from manifest URLs");

        // Discovery order is preserved; duplicate names pass through.
        let mut components = Vec::with_capacity(urls.len());
        for url in urls {
            components.push(self.resolve_component(&url, artifact_root).await?);
        }
        Ok(components)
    }

    /// Find the log containing the manifest marker and return its full text.
    ///
    /// Peeks the first [`LOG_PEEK_LINES`] lines of each log so only the
    /// matching log is downloaded in full.
    async fn locate_manifest_log(&self, project: &str, build_id: u64) -> Result<String> {
        let logs = self.service.list_logs(project, build_id).await?;

        for log in &logs {
            let lines = self
                .service
                .get_log_lines(project, build_id, log.id, 1, LOG_PEEK_LINES)
                .await?;
            if self.locator.lines_contain_marker(&lines) {
                debug!(log_id = log.id, "manifest marker found");
                return self.service.get_log_full_text(project, build_id, log.id).await;
            }
        }

        Err(BuildRelayError::upstream(format!(
            "marker '{}' not found in any log of build {build_id}",
            self.locator.marker()
        )))
    }

    /// Resolve one manifest URL to a component.
    async fn resolve_component(
        &self,
        url: &str,
        artifact_root: Option<&Path>,
    ) -> Result<Component> {
        let file_name = self.locator.file_name(url)?;
        let name = self.locator.component_name(&file_name);

        let json = match artifact_root.and_then(|root| find_file(root, &file_name)) {
            Some(local) => {
                debug!(path = %local.display(), "using local manifest copy");
                std::fs::read_to_string(&local).map_err(|e| BuildRelayError::io(&local, e))?
            }
            None => {
                debug!(url, "no local copy, fetching manifest");
                self.fetch_manifest(url).await?
            }
        };

        let version = extract_build_version(&json)?;
        if version.is_none() {
            warn!(component = %name, "manifest has no buildVersion field");
        }

        Ok(Component {
            name,
            file_name,
            manifest_url: url.to_string(),
            version,
        })
    }

    async fn fetch_manifest(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BuildRelayError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| BuildRelayError::Network(format!("{url}: body read failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Recursively search `dir` for a file named `name`.
fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && entry.file_name().to_str() == Some(name) {
            return Some(path);
        }
        if path.is_dir() {
            subdirs.push(path);
        }
    }

    subdirs.iter().find_map(|d| find_file(d, name))
}

/// Read `info.buildVersion` from manifest JSON.
///
/// An absent field is an acceptable outcome (`None`); malformed JSON is not.
pub fn extract_build_version(json: &str) -> Result<Option<String>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BuildRelayError::upstream(format!("malformed manifest JSON: {e}")))?;

    Ok(value
        .get("info")
        .and_then(|info| info.get("buildVersion"))
        .and_then(|v| v.as_str())
        .map(str::to_string))
}
