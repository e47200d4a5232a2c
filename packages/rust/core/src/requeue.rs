//! Bounded poll for requeueing a named build policy on a pull request.

use std::time::Duration;

use tracing::info;

use buildrelay_shared::error::{BuildRelayError, Result};
use buildrelay_shared::service::PolicyHost;

/// Default wall-clock bound for the requeue poll.
pub const POLICY_REQUEUE_TIMEOUT: Duration = Duration::from_secs(30);

/// Repeatedly fetch policy evaluations until one matching `policy_name`
/// (case-insensitive) appears, then requeue it.
///
/// The loop is a tight poll bounded purely by elapsed wall-clock time; the
/// fetch call itself is the only pacing. If the bound elapses with no match,
/// the policy is reported as not found.
pub async fn requeue_policy(
    host: &dyn PolicyHost,
    pull_request_id: u64,
    policy_name: &str,
    timeout: Duration,
) -> Result<()> {
    let started = tokio::time::Instant::now();

    loop {
        let evaluations = host.list_evaluations(pull_request_id).await?;

        if let Some(evaluation) = evaluations
            .iter()
            .find(|e| e.display_name.eq_ignore_ascii_case(policy_name))
        {
            host.requeue(pull_request_id, &evaluation.evaluation_id)
                .await?;
            info!(
                policy = policy_name,
                pull_request_id,
                evaluation_id = %evaluation.evaluation_id,
                "policy requeued"
            );
            return Ok(());
        }

        if started.elapsed() >= timeout {
            return Err(BuildRelayError::not_found(format!(
                "policy '{policy_name}' not found on pull request {pull_request_id} within {timeout:?}"
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use buildrelay_shared::types::PolicyEvaluation;

    use super::*;

    struct FakePolicyHost {
        evaluations: Vec<PolicyEvaluation>,
        list_calls: AtomicUsize,
        requeued: AtomicBool,
    }

    impl FakePolicyHost {
        fn with(evaluations: Vec<PolicyEvaluation>) -> Self {
            Self {
                evaluations,
                list_calls: AtomicUsize::new(0),
                requeued: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl PolicyHost for FakePolicyHost {
        async fn list_evaluations(&self, _pull_request_id: u64) -> Result<Vec<PolicyEvaluation>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.evaluations.clone())
        }

        async fn requeue(&self, _pull_request_id: u64, _evaluation_id: &str) -> Result<()> {
            self.requeued.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn matches_policy_name_case_insensitively() {
        let host = FakePolicyHost::with(vec![PolicyEvaluation {
            evaluation_id: "eval-1".into(),
            display_name: "Validation Build".into(),
            status: "queued".into(),
        }]);

        requeue_policy(&host, 7001, "validation build", POLICY_REQUEUE_TIMEOUT)
            .await
            .unwrap();
        assert!(host.requeued.load(Ordering::SeqCst));
        assert_eq!(host.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_policy_fails_after_the_bound_not_before() {
        let host = FakePolicyHost::with(vec![PolicyEvaluation {
            evaluation_id: "eval-1".into(),
            display_name: "Some Other Policy".into(),
            status: "queued".into(),
        }]);

        let timeout = Duration::from_millis(100);
        let started = std::time::Instant::now();
        let err = requeue_policy(&host, 7001, "Validation Build", timeout)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, BuildRelayError::NotFound { .. }));
        assert!(elapsed >= timeout, "failed early after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "poll never terminated");
        assert!(
            host.list_calls.load(Ordering::SeqCst) > 1,
            "expected repeated polling, not a single attempt"
        );
        assert!(!host.requeued.load(Ordering::SeqCst));
    }
}
