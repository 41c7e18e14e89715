// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authenticated principals.
//
// The transport layer authenticates a request and hands over a
// `RawAuthContext` (kind string + tagged payload). The only way to obtain a
// typed `AuthContext` from it is `TryFrom`, which rejects unknown kinds and
// payloads that do not belong to the declared kind.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultgateError};
use crate::types::{Permission, Role, WorkspaceId};

/// Environment wildcard accepted in service-account grants.
pub const ANY_ENVIRONMENT: &str = "*";

/// The four principal kinds this subsystem knows how to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrincipalKind {
    /// Session-authenticated user.
    User,
    ServiceAccount,
    ServiceToken,
    /// User authenticated with a personal API key.
    ApiKeyUser,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ServiceAccount => "serviceAccount",
            Self::ServiceToken => "serviceToken",
            Self::ApiKeyUser => "apiKeyUser",
        }
    }
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = VaultgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "serviceAccount" => Ok(Self::ServiceAccount),
            "serviceToken" => Ok(Self::ServiceToken),
            "apiKeyUser" => Ok(Self::ApiKeyUser),
            other => Err(VaultgateError::Unauthorized(format!(
                "unrecognized principal kind `{other}`"
            ))),
        }
    }
}

/// A human user, authenticated either by session or by API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActor {
    pub user_id: String,
    pub email: Option<String>,
}

impl UserActor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Permissions a service account holds in one workspace environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGrant {
    pub workspace_id: WorkspaceId,
    /// Environment slug, or [`ANY_ENVIRONMENT`].
    pub environment: String,
    pub permissions: BTreeSet<Permission>,
}

impl ScopeGrant {
    pub fn covers(&self, workspace_id: WorkspaceId, environment: &str) -> bool {
        self.workspace_id == workspace_id
            && (self.environment == ANY_ENVIRONMENT || self.environment == environment)
    }
}

/// A machine identity with explicit per-environment grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountActor {
    pub service_account_id: String,
    pub name: String,
    pub grants: Vec<ScopeGrant>,
}

/// A workspace-bound service token. Its own scope is authoritative: it may
/// reach every secret in the listed environments of its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTokenActor {
    pub service_token_id: String,
    pub workspace_id: WorkspaceId,
    pub environments: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ServiceTokenActor {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn covers(&self, workspace_id: WorkspaceId, environment: &str) -> bool {
        self.workspace_id == workspace_id && self.environments.iter().any(|env| env == environment)
    }
}

/// A user's standing in a workspace, as resolved by the membership directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: String,
    pub workspace_id: WorkspaceId,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
}

/// Typed authenticated context. Kind and payload always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    User(UserActor),
    ApiKeyUser(UserActor),
    ServiceAccount(ServiceAccountActor),
    ServiceToken(ServiceTokenActor),
}

impl AuthContext {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::ApiKeyUser(_) => PrincipalKind::ApiKeyUser,
            Self::ServiceAccount(_) => PrincipalKind::ServiceAccount,
            Self::ServiceToken(_) => PrincipalKind::ServiceToken,
        }
    }

    /// Identifier of the acting principal, for logs and the audit trail.
    pub fn principal_id(&self) -> &str {
        match self {
            Self::User(user) | Self::ApiKeyUser(user) => &user.user_id,
            Self::ServiceAccount(account) => &account.service_account_id,
            Self::ServiceToken(token) => &token.service_token_id,
        }
    }
}

/// Payload as delivered by the transport layer, tagged by shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActorPayload {
    User(UserActor),
    ServiceAccount(ServiceAccountActor),
    ServiceToken(ServiceTokenActor),
}

impl ActorPayload {
    fn shape(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::ServiceAccount(_) => "service account",
            Self::ServiceToken(_) => "service token",
        }
    }
}

/// Untrusted context: a kind tag and a payload that may disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAuthContext {
    pub kind: String,
    pub payload: ActorPayload,
}

impl TryFrom<RawAuthContext> for AuthContext {
    type Error = VaultgateError;

    fn try_from(raw: RawAuthContext) -> Result<Self> {
        let kind: PrincipalKind = raw.kind.parse()?;
        match (kind, raw.payload) {
            (PrincipalKind::User, ActorPayload::User(user)) => Ok(Self::User(user)),
            (PrincipalKind::ApiKeyUser, ActorPayload::User(user)) => Ok(Self::ApiKeyUser(user)),
            (PrincipalKind::ServiceAccount, ActorPayload::ServiceAccount(account)) => {
                Ok(Self::ServiceAccount(account))
            }
            (PrincipalKind::ServiceToken, ActorPayload::ServiceToken(token)) => {
                Ok(Self::ServiceToken(token))
            }
            (kind, payload) => Err(VaultgateError::Unauthorized(format!(
                "{kind} context carries a {} payload",
                payload.shape()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::permissions;
    use chrono::Duration;

    fn token(workspace_id: WorkspaceId) -> ServiceTokenActor {
        ServiceTokenActor {
            service_token_id: "st-1".into(),
            workspace_id,
            environments: vec!["prod".into()],
            expires_at: None,
        }
    }

    #[test]
    fn matching_kind_and_payload_converts() {
        let raw = RawAuthContext {
            kind: "apiKeyUser".into(),
            payload: ActorPayload::User(UserActor::new("u-1")),
        };
        let ctx = AuthContext::try_from(raw).unwrap();
        assert_eq!(ctx.kind(), PrincipalKind::ApiKeyUser);
        assert_eq!(ctx.principal_id(), "u-1");
    }

    #[test]
    fn unknown_kind_is_unauthorized() {
        let raw = RawAuthContext {
            kind: "robot".into(),
            payload: ActorPayload::User(UserActor::new("u-1")),
        };
        let err = AuthContext::try_from(raw).unwrap_err();
        assert!(matches!(err, VaultgateError::Unauthorized(_)));
    }

    #[test]
    fn user_payload_tagged_as_service_account_is_unauthorized() {
        let raw = RawAuthContext {
            kind: "serviceAccount".into(),
            payload: ActorPayload::User(UserActor::new("u-1")),
        };
        let err = AuthContext::try_from(raw).unwrap_err();
        assert!(matches!(err, VaultgateError::Unauthorized(_)));
        assert!(err.to_string().contains("serviceAccount"));
    }

    #[test]
    fn token_payload_tagged_as_user_is_unauthorized() {
        let raw = RawAuthContext {
            kind: "user".into(),
            payload: ActorPayload::ServiceToken(token(WorkspaceId::new())),
        };
        assert!(matches!(
            AuthContext::try_from(raw),
            Err(VaultgateError::Unauthorized(_))
        ));
    }

    #[test]
    fn raw_context_deserializes_from_transport_json() {
        let json = r#"{
            "kind": "user",
            "payload": { "type": "user", "user_id": "u-9", "email": "a@b.c" }
        }"#;
        let raw: RawAuthContext = serde_json::from_str(json).unwrap();
        let ctx = AuthContext::try_from(raw).unwrap();
        assert_eq!(ctx, AuthContext::User(UserActor::new("u-9").with_email("a@b.c")));
    }

    #[test]
    fn wildcard_grant_covers_every_environment_of_its_workspace() {
        let ws = WorkspaceId::new();
        let grant = ScopeGrant {
            workspace_id: ws,
            environment: ANY_ENVIRONMENT.into(),
            permissions: permissions(["read"]),
        };
        assert!(grant.covers(ws, "prod"));
        assert!(grant.covers(ws, "dev"));
        assert!(!grant.covers(WorkspaceId::new(), "prod"));
    }

    #[test]
    fn token_covers_only_listed_environments_of_its_workspace() {
        let ws = WorkspaceId::new();
        let t = token(ws);
        assert!(t.covers(ws, "prod"));
        assert!(!t.covers(ws, "dev"));
        assert!(!t.covers(WorkspaceId::new(), "prod"));
    }

    #[test]
    fn token_expiry_is_inclusive() {
        let now = Utc::now();
        let mut t = token(WorkspaceId::new());
        assert!(!t.is_expired_at(now));
        t.expires_at = Some(now);
        assert!(t.is_expired_at(now));
        t.expires_at = Some(now + Duration::minutes(5));
        assert!(!t.is_expired_at(now));
    }
}
