//! Application configuration for BuildRelay.
//!
//! User config lives at `~/.buildrelay/buildrelay.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildRelayError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "buildrelay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".buildrelay";

// ---------------------------------------------------------------------------
// Config structs (matching buildrelay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Build service connection.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Insertion target settings.
    #[serde(default)]
    pub insertion: InsertionConfig,

    /// Artifact resolution settings.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Manifest log parsing settings.
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Changelog compilation settings.
    #[serde(default)]
    pub changelog: ChangelogConfig,

    /// Policy requeue settings.
    #[serde(default)]
    pub requeue: RequeueConfig,
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the build service REST surface.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the access token (never store the token).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://build.example.com".into()
}
fn default_token_env() -> String {
    "BUILDRELAY_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[insertion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertionConfig {
    /// Project that owns the upstream builds.
    #[serde(default = "default_project")]
    pub project: String,

    /// Build queue (definition) name producing insertable builds.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Downstream branch the insertion PR targets.
    #[serde(default = "default_target_branch")]
    pub target_branch: String,

    /// Human-readable insertion name, used in PR titles and the scratch
    /// directory name.
    #[serde(default = "default_insertion_name")]
    pub insertion_name: String,

    /// Pre-resolved local artifacts directory. When set, artifact resolution
    /// bypasses the build service entirely (offline/test runs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_artifacts_dir: Option<String>,
}

impl Default for InsertionConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            queue: default_queue(),
            target_branch: default_target_branch(),
            insertion_name: default_insertion_name(),
            local_artifacts_dir: None,
        }
    }
}

fn default_project() -> String {
    "components".into()
}
fn default_queue() -> String {
    "component-ci".into()
}
fn default_target_branch() -> String {
    "main".into()
}
fn default_insertion_name() -> String {
    "Component Insertion".into()
}

/// `[artifacts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Fixed name of the modern container artifact. The legacy artifact name
    /// is the build number itself.
    #[serde(default = "default_modern_name")]
    pub modern_name: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            modern_name: default_modern_name(),
        }
    }
}

fn default_modern_name() -> String {
    "ComponentArtifacts".into()
}

/// `[manifest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Marker line announcing the manifest URL block in the build log.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Manifest file extension.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            extension: default_extension(),
        }
    }
}

fn default_marker() -> String {
    "Manifest urls:".into()
}
fn default_extension() -> String {
    ".manifest".into()
}

/// `[changelog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogConfig {
    /// Hard character budget for the PR description.
    #[serde(default = "default_hard_limit")]
    pub hard_limit: usize,

    /// Committer identity the hosting platform stamps on web merges.
    /// Commits with any other committer after the merge boundary are noise.
    #[serde(default = "default_platform_committer")]
    pub platform_committer: String,

    /// Author identity of the automated dependency-update bot.
    #[serde(default = "default_dependency_bot")]
    pub dependency_bot_author: String,

    /// Pattern (anchored at message start) matching automated release-flow
    /// merge commits.
    #[serde(default = "default_release_flow_pattern")]
    pub release_flow_pattern: String,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            hard_limit: default_hard_limit(),
            platform_committer: default_platform_committer(),
            dependency_bot_author: default_dependency_bot(),
            release_flow_pattern: default_release_flow_pattern(),
        }
    }
}

fn default_hard_limit() -> usize {
    4000
}
fn default_platform_committer() -> String {
    "GitHub".into()
}
fn default_dependency_bot() -> String {
    "dependabot[bot]".into()
}
fn default_release_flow_pattern() -> String {
    "^Merge (branch|remote-tracking branch) '".into()
}

/// `[requeue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueConfig {
    /// Wall-clock bound for the policy requeue poll, in seconds.
    #[serde(default = "default_requeue_timeout")]
    pub timeout_secs: u64,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_requeue_timeout(),
        }
    }
}

fn default_requeue_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.buildrelay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BuildRelayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.buildrelay/buildrelay.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildRelayError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BuildRelayError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BuildRelayError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BuildRelayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BuildRelayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the build service token env var is set and non-empty.
pub fn validate_token(config: &AppConfig) -> Result<()> {
    let var_name = &config.service.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(BuildRelayError::config(format!(
            "build service token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("BUILDRELAY_TOKEN"));
        assert!(toml_str.contains("ComponentArtifacts"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.insertion.target_branch, "main");
        assert_eq!(parsed.changelog.hard_limit, 4000);
        assert_eq!(parsed.requeue.timeout_secs, 30);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[insertion]
queue = "editor-ci"
target_branch = "release/2026"

[changelog]
hard_limit = 2500
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.insertion.queue, "editor-ci");
        assert_eq!(config.insertion.target_branch, "release/2026");
        assert_eq!(config.insertion.project, "components");
        assert_eq!(config.changelog.hard_limit, 2500);
        assert_eq!(config.changelog.platform_committer, "GitHub");
    }

    #[test]
    fn local_artifacts_dir_is_optional() {
        let toml_str = r#"
[insertion]
local_artifacts_dir = "/mnt/drops/editor/20260315.2"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(
            config.insertion.local_artifacts_dir.as_deref(),
            Some("/mnt/drops/editor/20260315.2")
        );
        assert!(AppConfig::default().insertion.local_artifacts_dir.is_none());
    }

    #[test]
    fn token_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.service.token_env = "BR_TEST_NONEXISTENT_TOKEN_98765".into();
        let result = validate_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }
}
