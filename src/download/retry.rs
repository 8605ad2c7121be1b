//! Bounded retry with exponential backoff, keyed per operation.
//!
//! The controller owns an arena of [`RetryState`] entries keyed by a
//! caller-chosen operation identifier, so concurrent distinct downloads never
//! share a retry budget. Only [`ResourceErrorKind::NetworkError`] and
//! [`ResourceErrorKind::DownloadFailed`] are retryable; every other kind is
//! terminal and propagates on the first failure.
//!
//! The delay before re-attempt `k` (k ≥ 2) is exactly
//! `min(initial_delay · multiplier^(k-2), max_delay)` — with the defaults,
//! 1000 ms then 2000 ms, capped at 10 000 ms for longer sequences. There is
//! deliberately no jitter: the schedule is part of the contract.

use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use crate::gateway::ResourceError;

/// Maximum operation invocations per exhaustion cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first re-attempt.
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Cap applied to every backoff delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Backoff multiplier applied per failed attempt.
const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Configuration for the bounded-retry schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    ///
    /// `max_retries` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: u32,
    ) -> Self {
        Self {
            max_retries: max_retries.max(1),
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Returns the maximum number of attempts per exhaustion cycle.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the backoff delay after `failed_attempts` failures (1-indexed).
    ///
    /// `min(initial_delay · multiplier^(failed_attempts-1), max_delay)`.
    #[must_use]
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = u64::from(self.backoff_multiplier)
            .checked_pow(exponent)
            .unwrap_or(u64::MAX);
        let initial_ms = self.initial_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = initial_ms.saturating_mul(factor).min(max_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Per-operation retry bookkeeping.
///
/// `attempts ≤ max_retries` holds at all observable times; an exhausted
/// state stays exhausted until an explicit [`RetryController::reset`].
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Failed attempts recorded so far.
    pub attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Whether the controller is currently between attempts.
    pub is_retrying: bool,
}

/// Result of a retried operation: the final outcome plus how many times the
/// operation was actually invoked.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final success value or the error that ended the attempt sequence.
    pub result: Result<T, ResourceError>,
    /// Total invocations of the operation in this call.
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Number of re-attempts beyond the first invocation.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Bounded-retry state machine over an arena of per-operation states.
///
/// Attempts for the *same* operation id must not run concurrently; that is a
/// caller discipline requirement, not enforced by an internal lock. Distinct
/// ids never contend.
#[derive(Debug, Default)]
pub struct RetryController {
    policy: RetryPolicy,
    states: DashMap<String, RetryState>,
}

impl RetryController {
    /// Creates a controller with the given policy.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            states: DashMap::new(),
        }
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation`, retrying retryable failures with backoff until it
    /// succeeds or the attempt budget for `operation_id` is exhausted.
    ///
    /// On success the operation's state is reset to zero attempts. On a
    /// terminal failure or budget exhaustion the state is left as-is, so a
    /// later call without [`reset`](Self::reset) fails immediately without
    /// invoking the operation again.
    #[instrument(skip(self, operation), fields(max_retries = self.policy.max_retries))]
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_id: &str,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResourceError>>,
    {
        let entry_attempts = {
            let state = self.states.entry(operation_id.to_string()).or_default();
            state.attempts
        };
        if entry_attempts >= self.policy.max_retries {
            warn!(attempts = entry_attempts, "retry budget already exhausted");
            return RetryOutcome {
                result: Err(ResourceError::download_failed(
                    operation_id,
                    "retry attempts exhausted; reset required before retrying",
                )),
                attempts: entry_attempts,
            };
        }

        let mut invocations = 0u32;
        loop {
            invocations += 1;
            debug!(invocation = invocations, "attempting operation");

            match operation().await {
                Ok(data) => {
                    let prior = self.record_success(operation_id);
                    return RetryOutcome {
                        result: Ok(data),
                        attempts: prior + 1,
                    };
                }
                Err(error) => {
                    let attempts = self.record_failure(operation_id, &error);
                    let retry = error.is_retryable() && attempts < self.policy.max_retries;
                    if !retry {
                        debug!(
                            attempts,
                            error = %error,
                            retryable = error.is_retryable(),
                            "not retrying"
                        );
                        self.set_retrying(operation_id, false);
                        return RetryOutcome {
                            result: Err(error),
                            attempts,
                        };
                    }

                    let delay = self.policy.delay_after(attempts);
                    debug!(
                        attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying after backoff"
                    );
                    self.set_retrying(operation_id, true);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Whether the operation still has attempt budget left.
    #[must_use]
    pub fn can_retry(&self, operation_id: &str) -> bool {
        self.states
            .get(operation_id)
            .is_none_or(|state| state.attempts < self.policy.max_retries)
    }

    /// Recorded failed attempts for the operation (0 when unknown).
    #[must_use]
    pub fn attempts(&self, operation_id: &str) -> u32 {
        self.states
            .get(operation_id)
            .map_or(0, |state| state.attempts)
    }

    /// Snapshot of the operation's retry state, if one exists.
    #[must_use]
    pub fn state(&self, operation_id: &str) -> Option<RetryState> {
        self.states.get(operation_id).map(|state| state.clone())
    }

    /// Zeroes the operation's state, making it eligible for a fresh attempt
    /// cycle.
    pub fn reset(&self, operation_id: &str) {
        if let Some(mut state) = self.states.get_mut(operation_id) {
            *state = RetryState::default();
        }
    }

    /// Deletes the operation's state entirely. Called when the owning task
    /// reaches a terminal status so abandoned ids do not accumulate.
    pub fn remove(&self, operation_id: &str) {
        self.states.remove(operation_id);
    }

    fn record_success(&self, operation_id: &str) -> u32 {
        let mut state = self.states.entry(operation_id.to_string()).or_default();
        let prior = state.attempts;
        *state = RetryState::default();
        prior
    }

    fn record_failure(&self, operation_id: &str, error: &ResourceError) -> u32 {
        let mut state = self.states.entry(operation_id.to_string()).or_default();
        state.attempts += 1;
        state.last_error = Some(error.to_string());
        state.attempts
    }

    fn set_retrying(&self, operation_id: &str, retrying: bool) {
        if let Some(mut state) = self.states.get_mut(operation_id) {
            state.is_retrying = retrying;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::gateway::ResourceError;

    fn controller() -> RetryController {
        RetryController::new(RetryPolicy::default())
    }

    // ==================== Delay Schedule ====================

    #[test]
    fn test_delay_schedule_is_exact() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay_after(30), Duration::from_millis(10_000));
    }

    #[test]
    fn test_policy_clamps_max_retries_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(10), 2);
        assert_eq!(policy.max_retries(), 1);
    }

    // ==================== Retry Bound ====================

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_invoke_exactly_max_retries_times() {
        let ctl = controller();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = ctl
            .execute_with_retry("op-a", move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ResourceError::network("connection reset"))
                }
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!ctl.can_retry("op-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_sum_to_expected_schedule() {
        let ctl = controller();
        let start = Instant::now();

        let outcome: RetryOutcome<()> = ctl
            .execute_with_retry("op-timing", || async {
                Err(ResourceError::network("flaky"))
            })
            .await;

        // 1000 ms + 2000 ms of backoff across three attempts.
        let elapsed = start.elapsed();
        assert!(outcome.result.is_err());
        assert!(
            elapsed >= Duration::from_millis(3000),
            "elapsed: {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(3500),
            "elapsed: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_fails_on_first_attempt() {
        let ctl = controller();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome: RetryOutcome<()> = ctl
            .execute_with_retry("op-terminal", move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ResourceError::quota_exceeded("some-id"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(matches!(
            outcome.result,
            Err(ResourceError::QuotaExceeded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_failures_reports_three_attempts() {
        let ctl = controller();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let outcome = ctl
            .execute_with_retry("op-recovers", move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ResourceError::download_failed("id", "stream reset"))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
        assert_eq!(outcome.result.unwrap(), 42);
        // Success resets the state.
        assert_eq!(ctl.attempts("op-recovers"), 0);
        assert!(ctl.can_retry("op-recovers"));
    }

    // ==================== Exhaustion & Reset ====================

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_state_fails_without_invoking() {
        let ctl = controller();
        let _: RetryOutcome<()> = ctl
            .execute_with_retry("op-b", || async { Err(ResourceError::network("down")) })
            .await;
        assert!(!ctl.can_retry("op-b"));

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome: RetryOutcome<()> = ctl
            .execute_with_retry("op-b", move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(outcome.result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_full_budget() {
        let ctl = controller();
        let _: RetryOutcome<()> = ctl
            .execute_with_retry("op-c", || async { Err(ResourceError::network("down")) })
            .await;
        assert!(!ctl.can_retry("op-c"));

        ctl.reset("op-c");
        assert!(ctl.can_retry("op-c"));
        assert_eq!(ctl.attempts("op-c"), 0);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome: RetryOutcome<()> = ctl
            .execute_with_retry("op-c", move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ResourceError::network("still down"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
    }

    // ==================== Keyed Isolation ====================

    #[tokio::test(start_paused = true)]
    async fn test_distinct_operation_ids_do_not_share_budget() {
        let ctl = controller();
        let _: RetryOutcome<()> = ctl
            .execute_with_retry("op-left", || async { Err(ResourceError::network("down")) })
            .await;
        assert!(!ctl.can_retry("op-left"));
        assert!(ctl.can_retry("op-right"));

        let outcome = ctl
            .execute_with_retry("op-right", || async { Ok("fine") })
            .await;
        assert_eq!(outcome.result.unwrap(), "fine");
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_remove_deletes_state() {
        let ctl = controller();
        ctl.record_failure("op-gone", &ResourceError::network("x"));
        assert_eq!(ctl.attempts("op-gone"), 1);
        ctl.remove("op-gone");
        assert!(ctl.state("op-gone").is_none());
    }

    #[test]
    fn test_state_snapshot_records_last_error() {
        let ctl = controller();
        ctl.record_failure("op-snap", &ResourceError::network("no route to host"));
        let state = ctl.state("op-snap").unwrap();
        assert_eq!(state.attempts, 1);
        assert!(state.last_error.unwrap().contains("no route to host"));
    }
}
