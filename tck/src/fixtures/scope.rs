//! Scoped fixture lifetime.
//!
//! A test body runs under the per-test wall clock; afterwards every account it
//! created and did not delete itself is removed, with leftovers going to the
//! operator. Cleanup is best effort: failures are logged and never replace
//! the body's result.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::timeout;

use crate::error::{Result, TckError};

use super::Fixtures;

/// Upper bound on cleanup, independent of the test's own limit.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `body` with `fixtures`, enforce `limit`, then clean up.
pub async fn run_scoped<T, F, Fut>(fixtures: Fixtures, limit: Duration, body: F) -> Result<T>
where
    F: FnOnce(Fixtures) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let result = match timeout(limit, body(fixtures.clone())).await {
        Ok(result) => result,
        Err(_) => Err(TckError::Timeout(limit)),
    };

    if let Err(e) = &result {
        debug!("test body failed, cleaning up anyway: {}", e);
    }
    if timeout(CLEANUP_TIMEOUT, cleanup(&fixtures)).await.is_err() {
        warn!("cleanup did not finish within {:?}", CLEANUP_TIMEOUT);
    }
    result
}

/// Delete every tracked account, newest first.
pub async fn cleanup(fixtures: &Fixtures) {
    let mut accounts = fixtures.take_tracked();
    accounts.reverse();

    for account in accounts {
        if let Err(e) = fixtures.delete_account(&account, None).await {
            warn!("cleanup: could not delete {}: {}", account.account_id, e);
        }
    }
}
