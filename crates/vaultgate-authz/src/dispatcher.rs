// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authorization dispatcher.
//
// Resolves the target secret(s), routes the decision to the validator for
// the context's principal kind, and returns the secret(s) only when that
// validator grants access. Validator errors are propagated as-is.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, instrument, warn};
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::principal::{AuthContext, PrincipalKind};
use vaultgate_core::types::{Permission, Role, Secret, SecretId};
use vaultgate_security::{AuditTrail, Decision, run_blocking};

use crate::repository::SecretRepository;
use crate::validators::{ServiceAccountValidator, ServiceTokenValidator, UserValidator};

const OP_SINGLE: &str = "validate_secret";
const OP_BATCH: &str = "validate_secrets";

/// Routes authorization decisions by principal kind.
#[derive(Clone)]
pub struct AuthorizationDispatcher {
    secrets: Arc<dyn SecretRepository>,
    users: Arc<dyn UserValidator>,
    service_accounts: Arc<dyn ServiceAccountValidator>,
    service_tokens: Arc<dyn ServiceTokenValidator>,
    audit: Option<Arc<AuditTrail>>,
}

impl AuthorizationDispatcher {
    pub fn new(
        secrets: Arc<dyn SecretRepository>,
        users: Arc<dyn UserValidator>,
        service_accounts: Arc<dyn ServiceAccountValidator>,
        service_tokens: Arc<dyn ServiceTokenValidator>,
    ) -> Self {
        Self {
            secrets,
            users,
            service_accounts,
            service_tokens,
            audit: None,
        }
    }

    /// Record every decision in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Authorize `context` against a single secret and return it.
    ///
    /// `accepted_roles` only applies to user-kind principals. Service
    /// accounts are checked by permission scope and service tokens by
    /// workspace/environment scope.
    ///
    /// # Errors
    ///
    /// - [`VaultgateError::NotFound`] if no secret has `secret_id`.
    /// - [`VaultgateError::Unauthorized`] from the principal's validator.
    #[instrument(skip_all, fields(kind = %context.kind(), %secret_id))]
    pub async fn validate_for_secret(
        &self,
        context: &AuthContext,
        secret_id: SecretId,
        accepted_roles: &[Role],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<Secret> {
        let outcome = self
            .authorize_one(context, secret_id, accepted_roles, required_permissions)
            .await;

        self.conclude(OP_SINGLE, context, &[secret_id], &outcome)
            .await;
        outcome
    }

    /// Authorize `context` against every secret in `secret_ids`, all or
    /// nothing. Secrets come back in first-occurrence order of `secret_ids`;
    /// repeated ids are collapsed.
    ///
    /// There is no role check on this path, only `required_permissions`.
    ///
    /// # Errors
    ///
    /// - [`VaultgateError::BadRequest`] if `secret_ids` is empty or any id
    ///   does not resolve. No validator runs in that case.
    /// - [`VaultgateError::Unauthorized`] if any secret is denied.
    #[instrument(skip_all, fields(kind = %context.kind(), count = secret_ids.len()))]
    pub async fn validate_for_secrets(
        &self,
        context: &AuthContext,
        secret_ids: &[SecretId],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<Vec<Secret>> {
        let mut seen = HashSet::with_capacity(secret_ids.len());
        let unique: Vec<SecretId> = secret_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let outcome = self
            .authorize_many(context, &unique, required_permissions)
            .await;

        self.conclude(OP_BATCH, context, &unique, &outcome).await;
        outcome
    }

    async fn authorize_one(
        &self,
        context: &AuthContext,
        secret_id: SecretId,
        accepted_roles: &[Role],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<Secret> {
        let secret = self
            .secrets
            .find_by_id(secret_id)
            .await?
            .ok_or_else(|| VaultgateError::NotFound(format!("secret {secret_id}")))?;

        match context {
            AuthContext::User(user) | AuthContext::ApiKeyUser(user) => {
                self.users
                    .authorize_secret(user, &secret, Some(accepted_roles), required_permissions)
                    .await?
            }
            AuthContext::ServiceAccount(account) => {
                self.service_accounts
                    .authorize_scope(
                        account,
                        secret.workspace_id,
                        &secret.environment,
                        required_permissions,
                    )
                    .await?
            }
            AuthContext::ServiceToken(token) => {
                self.service_tokens
                    .authorize_scope(token, secret.workspace_id, &secret.environment)
                    .await?
            }
        }

        Ok(secret)
    }

    async fn authorize_many(
        &self,
        context: &AuthContext,
        secret_ids: &[SecretId],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<Vec<Secret>> {
        if secret_ids.is_empty() {
            return Err(VaultgateError::BadRequest(
                "at least one secret id is required".into(),
            ));
        }

        let found = self.secrets.find_by_ids(secret_ids).await?;
        if found.len() != secret_ids.len() {
            return Err(VaultgateError::BadRequest(format!(
                "requested {} secrets but {} exist",
                secret_ids.len(),
                found.len()
            )));
        }

        let mut by_id: HashMap<SecretId, Secret> =
            found.into_iter().map(|secret| (secret.id, secret)).collect();
        let secrets = secret_ids
            .iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .ok_or_else(|| VaultgateError::BadRequest(format!("secret {id} not found")))
            })
            .collect::<Result<Vec<_>>>()?;

        match context {
            AuthContext::User(user) | AuthContext::ApiKeyUser(user) => {
                self.users
                    .authorize_secrets(user, &secrets, required_permissions)
                    .await?
            }
            AuthContext::ServiceAccount(account) => {
                self.service_accounts
                    .authorize_secrets(account, &secrets, required_permissions)
                    .await?
            }
            AuthContext::ServiceToken(token) => {
                self.service_tokens
                    .authorize_secrets(token, &secrets)
                    .await?
            }
        }

        Ok(secrets)
    }

    /// Log the outcome and append it to the audit trail, if one is attached.
    async fn conclude<T>(
        &self,
        operation: &'static str,
        context: &AuthContext,
        secret_ids: &[SecretId],
        outcome: &Result<T>,
    ) {
        let details = match outcome {
            Ok(_) => {
                debug!(principal = context.principal_id(), "access granted");
                None
            }
            Err(e) => {
                warn!(
                    principal = context.principal_id(),
                    code = e.code(),
                    error = %e,
                    "access denied"
                );
                Some(e.to_string())
            }
        };

        let Some(audit) = self.audit.clone() else {
            return;
        };
        let principal_kind: PrincipalKind = context.kind();
        let principal_id = context.principal_id().to_owned();
        let secret_ids = secret_ids.to_vec();
        let allowed = outcome.is_ok();

        let recorded = run_blocking(move || {
            audit.record(&Decision {
                operation,
                principal_kind,
                principal_id: &principal_id,
                secret_ids: &secret_ids,
                allowed,
                details: details.as_deref(),
            })
        })
        .await;

        if let Err(e) = recorded {
            error!(operation, error = %e, "failed to record authorization decision");
        }
    }
}
