// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! vaultgate-authz — Authorization for secret access.
//!
//! [`AuthorizationDispatcher`] takes an authenticated context and one or more
//! secret ids, resolves the secrets, and hands the decision to the validator
//! for the context's principal kind. [`VaultgateServices`] wires the
//! dispatcher, the blind-index generator and the SQLite stores together.

pub mod dispatcher;
pub mod repository;
pub mod services;
pub mod validators;

// PUBLIC API: Re-export the dispatcher and its collaborators
pub use dispatcher::AuthorizationDispatcher;
pub use repository::{InMemorySecretRepository, SecretRepository, SqliteSecretRepository};
pub use services::VaultgateServices;
pub use validators::{
    GrantServiceAccountValidator, InMemoryMembershipDirectory, MembershipDirectory,
    MembershipUserValidator, ScopedServiceTokenValidator, ServiceAccountValidator,
    ServiceTokenValidator, UserValidator,
};
