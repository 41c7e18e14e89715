// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Principal validators, one per principal kind.
//
// A validator returns `Ok(())` iff the principal may act on the target
// scope, and `Err(Unauthorized)` otherwise. The dispatcher picks the
// validator and propagates its error untouched.
//
// Each trait has a batch method. Its default implementation authorizes the
// secrets one by one and stops at the first failure, so a batch is granted
// as a whole or not at all.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::principal::{Membership, ServiceAccountActor, ServiceTokenActor, UserActor};
use vaultgate_core::types::{Permission, Role, Secret, WorkspaceId};

/// Authorizes users, whether session- or API-key-authenticated.
#[async_trait]
pub trait UserValidator: Send + Sync {
    /// `accepted_roles`: `Some(roles)` requires the user's workspace role to
    /// be one of `roles` (an empty list admits nobody); `None` skips the role
    /// check.
    async fn authorize_secret(
        &self,
        user: &UserActor,
        secret: &Secret,
        accepted_roles: Option<&[Role]>,
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()>;

    async fn authorize_secrets(
        &self,
        user: &UserActor,
        secrets: &[Secret],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()> {
        for secret in secrets {
            self.authorize_secret(user, secret, None, required_permissions)
                .await?;
        }
        Ok(())
    }
}

/// Authorizes service accounts by permission scope only.
#[async_trait]
pub trait ServiceAccountValidator: Send + Sync {
    async fn authorize_scope(
        &self,
        account: &ServiceAccountActor,
        workspace_id: WorkspaceId,
        environment: &str,
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()>;

    async fn authorize_secrets(
        &self,
        account: &ServiceAccountActor,
        secrets: &[Secret],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()> {
        for secret in secrets {
            self.authorize_scope(
                account,
                secret.workspace_id,
                &secret.environment,
                required_permissions,
            )
            .await?;
        }
        Ok(())
    }
}

/// Authorizes service tokens by workspace/environment scope only.
#[async_trait]
pub trait ServiceTokenValidator: Send + Sync {
    async fn authorize_scope(
        &self,
        token: &ServiceTokenActor,
        workspace_id: WorkspaceId,
        environment: &str,
    ) -> Result<()>;

    async fn authorize_secrets(&self, token: &ServiceTokenActor, secrets: &[Secret]) -> Result<()> {
        for secret in secrets {
            self.authorize_scope(token, secret.workspace_id, &secret.environment)
                .await?;
        }
        Ok(())
    }
}

/// Fail with `Unauthorized` unless `held` contains every permission in
/// `required`.
fn require_permissions(
    who: &str,
    held: &BTreeSet<Permission>,
    required: &BTreeSet<Permission>,
) -> Result<()> {
    let missing: Vec<&str> = required
        .difference(held)
        .map(Permission::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(VaultgateError::Unauthorized(format!(
            "{who} lacks permission(s): {}",
            missing.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Resolves a user's role and permissions inside a workspace.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn find_membership(
        &self,
        user_id: &str,
        workspace_id: WorkspaceId,
    ) -> Result<Option<Membership>>;
}

#[derive(Default)]
pub struct InMemoryMembershipDirectory {
    memberships: RwLock<HashMap<(String, WorkspaceId), Membership>>,
}

impl InMemoryMembershipDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a membership.
    pub fn insert(&self, membership: Membership) -> Result<()> {
        self.memberships
            .write()
            .map_err(|_| VaultgateError::Database("membership lock poisoned".into()))?
            .insert(
                (membership.user_id.clone(), membership.workspace_id),
                membership,
            );
        Ok(())
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryMembershipDirectory {
    async fn find_membership(
        &self,
        user_id: &str,
        workspace_id: WorkspaceId,
    ) -> Result<Option<Membership>> {
        Ok(self
            .memberships
            .read()
            .map_err(|_| VaultgateError::Database("membership lock poisoned".into()))?
            .get(&(user_id.to_owned(), workspace_id))
            .cloned())
    }
}

/// User validator backed by a membership directory.
pub struct MembershipUserValidator {
    directory: Arc<dyn MembershipDirectory>,
}

impl MembershipUserValidator {
    pub fn new(directory: Arc<dyn MembershipDirectory>) -> Self {
        Self { directory }
    }

    async fn membership(&self, user: &UserActor, workspace_id: WorkspaceId) -> Result<Membership> {
        self.directory
            .find_membership(&user.user_id, workspace_id)
            .await?
            .ok_or_else(|| {
                VaultgateError::Unauthorized(format!(
                    "user {} is not a member of workspace {workspace_id}",
                    user.user_id
                ))
            })
    }
}

fn check_membership(
    membership: &Membership,
    accepted_roles: Option<&[Role]>,
    required_permissions: &BTreeSet<Permission>,
) -> Result<()> {
    if let Some(roles) = accepted_roles {
        if !roles.contains(&membership.role) {
            return Err(VaultgateError::Unauthorized(format!(
                "role `{}` is not accepted for this operation",
                membership.role
            )));
        }
    }
    require_permissions(
        &format!("user {}", membership.user_id),
        &membership.permissions,
        required_permissions,
    )
}

#[async_trait]
impl UserValidator for MembershipUserValidator {
    async fn authorize_secret(
        &self,
        user: &UserActor,
        secret: &Secret,
        accepted_roles: Option<&[Role]>,
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()> {
        let membership = self.membership(user, secret.workspace_id).await?;
        check_membership(&membership, accepted_roles, required_permissions)
    }

    /// Resolves each distinct workspace once.
    async fn authorize_secrets(
        &self,
        user: &UserActor,
        secrets: &[Secret],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()> {
        let mut checked = HashSet::new();
        for secret in secrets {
            if checked.insert(secret.workspace_id) {
                let membership = self.membership(user, secret.workspace_id).await?;
                check_membership(&membership, None, required_permissions)?;
            }
        }
        debug!(workspaces = checked.len(), "user batch authorized");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service accounts
// ---------------------------------------------------------------------------

/// Checks a service account's own grants. Permissions from different grants
/// are not combined: one grant must cover the scope and hold them all.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantServiceAccountValidator;

#[async_trait]
impl ServiceAccountValidator for GrantServiceAccountValidator {
    async fn authorize_scope(
        &self,
        account: &ServiceAccountActor,
        workspace_id: WorkspaceId,
        environment: &str,
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<()> {
        let who = format!("service account {}", account.service_account_id);
        let mut covering = account
            .grants
            .iter()
            .filter(|grant| grant.covers(workspace_id, environment))
            .peekable();

        if covering.peek().is_none() {
            return Err(VaultgateError::Unauthorized(format!(
                "{who} has no grant for {workspace_id}/{environment}"
            )));
        }

        let mut last_denial = None;
        for grant in covering {
            match require_permissions(&who, &grant.permissions, required_permissions) {
                Ok(()) => return Ok(()),
                Err(e) => last_denial = Some(e),
            }
        }
        Err(last_denial.unwrap_or_else(|| {
            VaultgateError::Unauthorized(format!("{who} is not authorized"))
        }))
    }
}

// ---------------------------------------------------------------------------
// Service tokens
// ---------------------------------------------------------------------------

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Checks expiry, then workspace, then environment.
#[derive(Clone)]
pub struct ScopedServiceTokenValidator {
    now: Clock,
}

impl Default for ScopedServiceTokenValidator {
    fn default() -> Self {
        Self {
            now: Arc::new(Utc::now),
        }
    }
}

impl ScopedServiceTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the wall clock used for expiry checks.
    pub fn with_clock(now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self { now: Arc::new(now) }
    }
}

#[async_trait]
impl ServiceTokenValidator for ScopedServiceTokenValidator {
    async fn authorize_scope(
        &self,
        token: &ServiceTokenActor,
        workspace_id: WorkspaceId,
        environment: &str,
    ) -> Result<()> {
        let id = &token.service_token_id;
        if token.is_expired_at((self.now)()) {
            return Err(VaultgateError::Unauthorized(format!(
                "service token {id} has expired"
            )));
        }
        if token.workspace_id != workspace_id {
            return Err(VaultgateError::Unauthorized(format!(
                "service token {id} is not scoped to workspace {workspace_id}"
            )));
        }
        if !token.covers(workspace_id, environment) {
            return Err(VaultgateError::Unauthorized(format!(
                "service token {id} is not scoped to environment `{environment}`"
            )));
        }
        Ok(())
    }
}
