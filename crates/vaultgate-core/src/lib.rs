// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vaultgate — Core types, principal payloads, configuration and the error
// taxonomy shared across all crates.

pub mod config;
pub mod error;
pub mod principal;
pub mod types;

pub use config::{BlindIndexParams, VaultgateConfig};
pub use error::VaultgateError;
pub use principal::*;
pub use types::*;
