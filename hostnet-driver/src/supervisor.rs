//! Bounded restarts for the lifecycle subscription

use async_trait::async_trait;
use hostnet_core::{Error, RestartPolicy, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A lifecycle subscription that can be restarted
///
/// `run` returns when the subscription ends, either with an error or because
/// the stream closed. It should return promptly once `cancel` fires, but
/// finish any event it is already dispatching.
#[async_trait]
pub trait LifecycleSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run the subscription to its end
    ///
    /// # Errors
    /// Returns error if the subscription fails
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

/// Keep `source` running, restarting it after failures
///
/// Every end of the subscription counts as a failure unless it had been up
/// longer than the stability threshold, which resets the count.
///
/// # Errors
/// Returns `RestartsExhausted` once `policy.max_attempts` consecutive
/// failures have occurred. Cancellation returns `Ok(())`.
pub async fn run_supervised(
    source: &dyn LifecycleSource,
    policy: &RestartPolicy,
    cancel: CancellationToken,
) -> Result<()> {
    let mut attempt: u32 = 0;

    loop {
        let started = Instant::now();

        match source.run(cancel.clone()).await {
            Ok(()) => tracing::warn!(source = source.name(), "Lifecycle subscription ended"),
            Err(e) => {
                tracing::error!(source = source.name(), error = %e, "Lifecycle subscription failed");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        if started.elapsed() > policy.stability_threshold() {
            tracing::info!(
                source = source.name(),
                threshold_secs = policy.stability_threshold_secs,
                "Subscription was stable, resetting retry counter"
            );
            attempt = 0;
        } else {
            attempt += 1;
        }

        if attempt >= policy.max_attempts {
            tracing::error!(
                source = source.name(),
                attempts = attempt,
                "Lifecycle subscription failed to restart"
            );
            return Err(Error::RestartsExhausted { attempts: attempt });
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(policy.delay()) => {
                tracing::info!(
                    source = source.name(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    "Restarting lifecycle subscription"
                );
            }
        }
    }

    tracing::info!(source = source.name(), "Lifecycle supervision stopped");
    Ok(())
}
