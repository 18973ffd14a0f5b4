use std::future::Future;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, CacheResult};

/// Race `future` against `cancel`.
///
/// # Cancel safety
///
/// The provided future must be cancel safe. Cancellation wins ties.
pub async fn cancel_on_token<Fut>(cancel: &CancellationToken, future: Fut) -> CacheResult<Fut::Output>
where
    Fut: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CacheError::Cancelled),
        output = future => Ok(output),
    }
}

pub fn error_if_cancelled(cancel: &CancellationToken) -> CacheResult<()> {
    if cancel.is_cancelled() {
        Err(CacheError::Cancelled)
    } else {
        Ok(())
    }
}

/// Token that cancels itself once `timeout` elapses.
///
/// Must be called from within a tokio runtime. Cancelling the returned token
/// early also stops the timer task.
pub fn deadline(timeout: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(timeout) => timer.cancel(),
        }
    });
    cancel
}
