// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `rusqlite` and Argon2 are synchronous; this moves such work off the async
// executor threads.

use vaultgate_core::error::{Result, VaultgateError};

/// Run `f` on tokio's blocking pool and flatten the join error into a
/// `VaultgateError::Database`.
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VaultgateError::Database(format!("blocking task failed: {e}")))?
}
