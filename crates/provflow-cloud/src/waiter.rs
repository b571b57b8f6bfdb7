//! Polling waits for asynchronous convergence
//!
//! One primitive covers every "wait until X reaches status Y" loop: a fetch
//! function reports the current state (or `None` when the resource is gone),
//! a predicate decides whether the target is reached, and the wait ends on
//! success, deadline or cancellation.

use crate::error::{CloudError, Result};
use futures_util::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a wait does when the resource is reported missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenMissing {
    /// The resource is gone, which is what a delete-style wait wants
    Done,
    /// Missing is a failure
    Fail,
    /// Keep polling; the resource may not be visible yet
    Retry,
}

/// Polling budget and interval
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub interval: Duration,
    pub when_missing: WhenMissing,
}

impl WaitConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            when_missing: WhenMissing::Fail,
        }
    }

    pub fn secs(timeout: u64, interval: u64) -> Self {
        Self::new(Duration::from_secs(timeout), Duration::from_secs(interval))
    }

    pub fn when_missing(mut self, when_missing: WhenMissing) -> Self {
        self.when_missing = when_missing;
        self
    }
}

/// Cancellable poller
#[derive(Debug, Clone)]
pub struct Waiter {
    config: WaitConfig,
    cancel: CancellationToken,
}

impl Waiter {
    pub fn new(config: WaitConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Poll `fetch` until `done` holds.
    ///
    /// Returns the final observed state, or `None` when the resource
    /// disappeared and the config treats that as completion.
    pub async fn wait_for<T, F, Fut, P>(&self, target: &str, mut fetch: F, done: P) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
        P: Fn(&T) -> bool,
    {
        let deadline = Instant::now() + self.config.timeout;

        loop {
            match fetch().await? {
                Some(state) if done(&state) => {
                    tracing::debug!(target_id = %target, "Wait target reached");
                    return Ok(Some(state));
                }
                Some(_) => {}
                None => match self.config.when_missing {
                    WhenMissing::Done => {
                        tracing::debug!(target_id = %target, "Resource gone");
                        return Ok(None);
                    }
                    WhenMissing::Fail => {
                        return Err(CloudError::NotFound(target.to_string()));
                    }
                    WhenMissing::Retry => {}
                },
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CloudError::Timeout(format!(
                    "{} did not converge within {:?}",
                    target, self.config.timeout
                )));
            }

            let pause = self.config.interval.min(deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(CloudError::Cancelled(target.to_string()));
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Poll a status string until it equals `desired`
    pub async fn wait_for_status<F, Fut>(&self, target: &str, desired: &str, fetch: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<String>>>,
    {
        tracing::info!(target_id = %target, desired, "Waiting for status");
        self.wait_for(target, fetch, |status: &String| {
            status.eq_ignore_ascii_case(desired)
        })
        .await?;
        Ok(())
    }
}

/// Per-target outcome of a fan-out wait
#[derive(Debug, Default)]
pub struct WaitReport {
    /// Failed targets in the order they were given
    pub errors: Vec<(String, CloudError)>,
    pub completed: usize,
}

impl WaitReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Surface the first failure only
    pub fn into_result(self) -> Result<()> {
        match self.errors.into_iter().next() {
            Some((target, err)) => {
                tracing::warn!(target_id = %target, "Fan-out wait failed");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// Wait on every target concurrently and join on all of them.
///
/// A failing target never cuts the others short; wall-clock time is bounded
/// by the slowest target.
pub async fn wait_all<I, F, Fut>(targets: I, wait_one: F) -> WaitReport
where
    I: IntoIterator<Item = String>,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let waits = targets.into_iter().map(|target| {
        let wait = wait_one(target.clone());
        async move { (target, wait.await) }
    });

    let mut report = WaitReport::default();
    for (target, outcome) in join_all(waits).await {
        match outcome {
            Ok(()) => report.completed += 1,
            Err(err) => {
                tracing::debug!(target_id = %target, error = %err, "Wait failed");
                report.errors.push((target, err));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_wait_reaches_status() {
        let polls = Mutex::new(0);
        let waiter = Waiter::new(WaitConfig::secs(30, 5));
        let started = Instant::now();

        waiter
            .wait_for_status("vpc-1", "Available", || {
                let n = {
                    let mut polls = polls.lock().unwrap();
                    *polls += 1;
                    *polls
                };
                async move {
                    let status = if n < 3 { "Pending" } else { "Available" };
                    Ok::<_, CloudError>(Some(status.to_string()))
                }
            })
            .await
            .unwrap();

        assert_eq!(*polls.lock().unwrap(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let waiter = Waiter::new(WaitConfig::secs(12, 5));
        let started = Instant::now();

        let err = waiter
            .wait_for_status("vpc-1", "Available", || async {
                Ok::<_, CloudError>(Some("Pending".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Timeout(_)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(12) && elapsed < Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_resource() {
        let gone = Waiter::new(WaitConfig::secs(30, 5).when_missing(WhenMissing::Done));
        let state: Option<String> = gone
            .wait_for("cluster-1", || async { Ok::<Option<String>, CloudError>(None) }, |_| false)
            .await
            .unwrap();
        assert!(state.is_none());

        let strict = Waiter::new(WaitConfig::secs(30, 5));
        let err = strict
            .wait_for_status("vsw-1", "Available", || async { Ok::<Option<String>, CloudError>(None) })
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled() {
        let cancel = CancellationToken::new();
        let waiter = Waiter::new(WaitConfig::secs(600, 10)).with_cancel(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            cancel.cancel();
        });

        let err = waiter
            .wait_for_status("cluster-1", "running", || async {
                Ok::<_, CloudError>(Some("initial".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Cancelled(_)));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_waits_for_slowest() {
        let started = Instant::now();

        let report = wait_all(
            vec!["one".to_string(), "two".to_string(), "three".to_string()],
            |target| async move {
                if target == "two" {
                    return Err(CloudError::Timeout(target));
                }
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
        )
        .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        assert_eq!(report.completed, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "two");
        assert!(matches!(report.into_result(), Err(CloudError::Timeout(_))));
    }
}
