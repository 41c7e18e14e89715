// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for secrets, workspaces and blind indexes.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VaultgateError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = VaultgateError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    VaultgateError::BadRequest(format!(
                        "invalid {}: {e}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a stored secret.
    SecretId
);

uuid_id!(
    /// Unique identifier for a workspace (project).
    WorkspaceId
);

/// Opaque, fixed-length search key derived from a secret name.
///
/// Only ever compared for equality; it cannot be turned back into a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlindIndexValue(String);

impl BlindIndexValue {
    /// Wrap an already-encoded index (e.g. one read back from storage).
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for BlindIndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A workspace role such as `admin`, `member` or `viewer`. Custom role slugs
/// are allowed; comparison is exact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A permission string such as `read` or `write`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(pub String);

impl Permission {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Permission {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build a permission set from string literals.
pub fn permissions<I, S>(items: I) -> BTreeSet<Permission>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|p| Permission(p.as_ref().to_owned()))
        .collect()
}

/// Build a role list from string literals.
pub fn roles<I, S>(items: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|r| Role(r.as_ref().to_owned()))
        .collect()
}

/// A stored secret, as seen by the authorization core.
///
/// The value itself is never visible here. Every secret belongs to exactly
/// one workspace and one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub id: SecretId,
    pub workspace_id: WorkspaceId,
    /// Environment slug, e.g. `dev`, `staging`, `prod`.
    pub environment: String,
    /// Name as handed over by the write path.
    pub name: String,
    /// Index for exact-match lookup by name. `None` for secrets written
    /// before blind indexing was enabled in the workspace.
    pub blind_index: Option<BlindIndexValue>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Secret {
    /// Create a new version-1 secret record.
    pub fn new(
        workspace_id: WorkspaceId,
        environment: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SecretId::new(),
            workspace_id,
            environment: environment.into(),
            name: name.into(),
            blind_index: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_blind_index(mut self, index: BlindIndexValue) -> Self {
        self.blind_index = Some(index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_display() {
        let id = SecretId::new();
        let parsed: SecretId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn malformed_id_is_bad_request() {
        let err = "not-a-uuid".parse::<WorkspaceId>().unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = WorkspaceId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn new_secret_has_no_index() {
        let secret = Secret::new(WorkspaceId::new(), "prod", "DB_PASSWORD");
        assert_eq!(secret.version, 1);
        assert!(secret.blind_index.is_none());

        let indexed = secret.with_blind_index(BlindIndexValue::from_encoded("abc="));
        assert_eq!(indexed.blind_index.unwrap().as_str(), "abc=");
    }

    #[test]
    fn permission_helper_dedups() {
        let set = permissions(["read", "write", "read"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Permission::from("write")));
    }
}
