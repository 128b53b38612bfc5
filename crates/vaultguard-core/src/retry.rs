//! Retry on transient storage contention

use crate::StorageResult;
use std::thread;
use vaultguard_params::LockPolicy;

/// Run `f`, retrying on [`crate::StorageError::Busy`] per the policy's backoff
/// schedule. Any other error is returned immediately.
///
/// `what` names the operation in logs.
pub fn with_busy_retry<T, F>(policy: &LockPolicy, what: &str, mut f: F) -> StorageResult<T>
where
    F: FnMut() -> StorageResult<T>,
{
    let max_retries = policy.max_retries();
    let mut retries = 0;

    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                retries += 1;
                let Some(backoff) = policy.backoff(retries) else {
                    tracing::warn!("{}: storage still busy after {} retries, giving up", what, max_retries);
                    return Err(e);
                };
                tracing::debug!(
                    "{}: storage busy (retry {}/{}), retrying in {}ms",
                    what,
                    retries,
                    max_retries,
                    backoff.as_millis()
                );
                thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}
