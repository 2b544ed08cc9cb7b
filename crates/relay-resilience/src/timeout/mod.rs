//! Timeout wrapper for async operations.

use relay_core::RelayError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// The wrapped operation did not finish in time and was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

impl From<TimeoutError> for RelayError {
    fn from(err: TimeoutError) -> Self {
        RelayError::Timeout(format!("{:?}", err.0))
    }
}

/// Runs a future with a deadline.
///
/// On expiry the future is dropped, so destructors of anything it owns run
/// before this returns.
///
/// # Errors
///
/// Returns [`TimeoutError`] when `duration` elapses first.
pub async fn with_timeout<Fut>(duration: Duration, fut: Fut) -> Result<Fut::Output, TimeoutError>
where
    Fut: Future,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| TimeoutError(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_exceeded() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_timeout_drops_inner_future() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = SetOnDrop(dropped.clone());

        let result = with_timeout(Duration::from_millis(10), async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        assert!(result.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_into_relay_error() {
        let err: RelayError = TimeoutError(Duration::from_secs(300)).into();
        assert!(matches!(err, RelayError::Timeout(_)));
    }
}
