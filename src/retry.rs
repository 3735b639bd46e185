/* Generic exponential-backoff retry loop with cancellation (4.D). */

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::CoreError;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/* A broadcast-once termination signal owned by the Lifecycle (3, 5). Closing
 * it twice is a no-op: a `watch` channel setting the same value twice is
 * itself a no-op, so no extra bookkeeping is needed for idempotent shutdown
 * from multiple paths. */
#[derive(Clone)]
pub struct RetryCancel {
    tx: watch::Sender<bool>,
}

impl RetryCancel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /* Wait until either `duration` elapses or this signal fires. */
    async fn wait_or_cancel(&self, duration: Duration) -> Result<(), CoreError> {
        let mut rx = self.subscribe();
        if *rx.borrow() {
            return Err(CoreError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            result = rx.changed() => {
                match result {
                    Ok(()) if *rx.borrow() => Err(CoreError::Cancelled),
                    _ => Ok(()),
                }
            }
        }
    }
}

impl Default for RetryCancel {
    fn default() -> Self {
        Self::new()
    }
}

/* Delay before attempt `n` (n >= 2), per spec.md §8: `min(base*2^(n-2), max)`. */
pub fn delay_for_attempt(attempt: u32, base: Duration, max: Duration) -> Duration {
    debug_assert!(attempt >= 2);
    let exp = attempt - 2;
    let scaled = base.checked_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
    match scaled {
        Some(d) if d < max => d,
        _ => max,
    }
}

/* Call `op` up to `max_attempts` times, waiting `min(base*2^(n-1), max)`
 * between attempt n and n+1 (1-indexed as in spec.md §4.D: the first gap is
 * n=1, matching `delay_for_attempt(2, ..)`). On exhaustion the last error is
 * wrapped as `CoreError::BackendUnavailable`; a fired `cancel` aborts the
 * in-flight wait with `CoreError::Cancelled`. */
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base: Duration,
    max: Duration,
    cancel: &RetryCancel,
    mut op: F,
) -> Result<T, CoreError>
where
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err: Option<E> = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!("attempt {attempt}/{max_attempts} failed: {e}");
                last_err = Some(e);
            }
        }

        if attempt < max_attempts {
            let delay = delay_for_attempt(attempt + 1, base, max);
            debug!("waiting {delay:?} before attempt {}", attempt + 1);
            cancel.wait_or_cancel(delay).await?;
        }
    }

    Err(CoreError::BackendUnavailable(anyhow::anyhow!(
        last_err.expect("at least one attempt ran")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn delay_formula_matches_spec() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(10);
        assert_eq!(delay_for_attempt(2, base, max), Duration::from_secs(1));
        assert_eq!(delay_for_attempt(3, base, max), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(4, base, max), Duration::from_secs(4));
        assert_eq!(delay_for_attempt(7, base, max), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn succeeds_on_first_try_without_waiting() {
        let cancel = RetryCancel::new();
        let result: Result<u32, CoreError> =
            retry_with_backoff(3, Duration::from_millis(1), Duration::from_millis(5), &cancel, |_| async {
                Ok::<u32, Boom>(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn exhausts_and_wraps_last_error() {
        let cancel = RetryCancel::new();
        let attempts = AtomicU32::new(0);
        let result: Result<u32, CoreError> = retry_with_backoff(
            3,
            Duration::from_millis(1),
            Duration::from_millis(5),
            &cancel,
            |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, Boom>(Boom) }
            },
        )
        .await;
        assert!(matches!(result, Err(CoreError::BackendUnavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_wait() {
        let cancel = RetryCancel::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel2.cancel();
        });
        let result: Result<u32, CoreError> = retry_with_backoff(
            5,
            Duration::from_millis(200),
            Duration::from_secs(1),
            &cancel,
            |_| async { Err::<u32, Boom>(Boom) },
        )
        .await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }

    #[test]
    fn double_cancel_is_idempotent() {
        let cancel = RetryCancel::new();
        cancel.cancel();
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }
}
