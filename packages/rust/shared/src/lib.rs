//! Shared types, error model, configuration, and service traits for BuildRelay.
//!
//! This crate is the foundation depended on by all other BuildRelay crates.
//! It intentionally has no network or filesystem behavior of its own beyond
//! config loading.

pub mod config;
pub mod error;
pub mod service;
pub mod types;

pub use config::{
    AppConfig, ArtifactsConfig, ChangelogConfig, InsertionConfig, ManifestConfig, RequeueConfig,
    ServiceConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_token,
};
pub use error::{BuildRelayError, Result};
pub use types::{
    ArtifactDescriptor, BuildCandidate, BuildLogRef, BuildOutcome, CommitRecord, Component,
    InsertionArtifacts, PolicyEvaluation, PullRequestSpec, RepositoryRef,
};
