use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use super::ClientError;
use crate::internal_events::WriteConflict;

/// Attempts a conflicting write gets before the conflict is returned.
pub const CONFLICT_RETRIES: usize = 5;
const BACKOFF: Duration = Duration::from_millis(100);

/// Runs `operation` until it succeeds, fails with anything but a conflict, or runs out of
/// attempts.
///
/// `operation` must re-read the object it writes: a conflict means the resource version it
/// held is stale.
pub async fn retry_on_conflict<T, F, Fut>(
    what: &str,
    attempts: usize,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut remaining = attempts.max(1);
    loop {
        remaining -= 1;
        match operation().await {
            Err(error) if error.is_conflict() && remaining > 0 => {
                emit!(WriteConflict { what });
                debug!(message = "Retrying after conflict.", what, remaining);
                tokio::time::sleep(BACKOFF).await;
            }
            Err(error) if error.is_conflict() => {
                warn!(message = "Retries exhausted.", what, %error);
                return Err(error);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn conflict() -> ClientError {
        ClientError::Conflict {
            message: "the object has been modified".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_only_conflicts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = retry_on_conflict("secret", 3, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(conflict())
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_on_conflict("secret", 3, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::NotFound {
                kind: "Secret".into(),
                name: "ns/a".into(),
            })
        })
        .await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempts() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_on_conflict("daemonset", 3, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
