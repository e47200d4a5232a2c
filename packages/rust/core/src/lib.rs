//! Core pipeline orchestration for BuildRelay.
//!
//! Ties together build selection, artifact resolution, component version
//! resolution, and changelog compilation into one sequential insertion
//! attempt, and hosts the bounded policy-requeue helper.

pub mod pipeline;
pub mod requeue;

pub use pipeline::{
    Collaborators, InsertionOptions, InsertionOutcome, ProgressReporter, SilentProgress,
    run_insertion,
};
pub use requeue::{POLICY_REQUEUE_TIMEOUT, requeue_policy};
