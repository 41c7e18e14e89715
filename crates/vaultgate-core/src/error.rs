// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Vaultgate.

use thiserror::Error;

/// Top-level error type for all Vaultgate operations.
///
/// The first three variants are the decision taxonomy surfaced to callers.
/// The rest are infrastructure failures and are never reported as one of
/// the decision variants.
#[derive(Debug, Error)]
pub enum VaultgateError {
    // -- Decision errors --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // -- Blind indexing --
    #[error("blind index hashing failed: {0}")]
    Hashing(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultgateError {
    /// Stable machine-readable code for the API layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Hashing(_) => "hashing_failed",
            Self::Config(_) => "invalid_config",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// `true` for `NotFound`, `BadRequest` and `Unauthorized`.
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::BadRequest(_) | Self::Unauthorized(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VaultgateError>;
