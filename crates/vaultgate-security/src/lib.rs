// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! vaultgate-security — Cryptographic and persistence primitives.
//!
//! Blind indexes let a secret be found by its exact name without the name
//! ever being stored in a searchable form. Each workspace owns one immutable
//! salt; the index is Argon2id(name, salt) so equal names in a workspace
//! always meet at the same index. The crate also carries the append-only
//! audit trail of authorization decisions.

pub mod audit;
pub mod blind_index;
pub mod blocking;
pub mod salt_store;

// PUBLIC API: Re-export core security primitives
pub use audit::{AuditEntry, AuditTrail, Decision};
pub use blind_index::BlindIndexGenerator;
pub use blocking::run_blocking;
pub use salt_store::{BlindIndexStore, InMemorySaltStore, SaltRecord, SqliteSaltStore};
