// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capped-backoff retry for transient database errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::StorageError;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(50);

/// Run `op` up to three times, backing off 50ms/100ms between attempts.
/// Only transient errors (lock contention, pool timeout) are retried;
/// everything else returns on the first failure.
pub async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(%label, attempt, error = %err, "transient database error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
