// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: opens the stores under one data directory and wires the
// dispatcher and blind-index generator to them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};
use vaultgate_core::VaultgateConfig;
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::principal::AuthContext;
use vaultgate_core::types::{Permission, Role, Secret, WorkspaceId};
use vaultgate_security::{AuditTrail, BlindIndexGenerator, SqliteSaltStore};

use crate::dispatcher::AuthorizationDispatcher;
use crate::repository::{SecretRepository, SqliteSecretRepository};
use crate::validators::{
    GrantServiceAccountValidator, MembershipDirectory, MembershipUserValidator,
    ScopedServiceTokenValidator,
};

const SECRETS_DB: &str = "secrets.db";
const SALTS_DB: &str = "salts.db";
const AUDIT_DB: &str = "audit.db";

/// Everything needed to authorize secret access and search by name.
///
/// Cheap to clone; all members are `Arc`-shared.
#[derive(Clone)]
pub struct VaultgateServices {
    secrets: Arc<SqliteSecretRepository>,
    dispatcher: AuthorizationDispatcher,
    blind_index: BlindIndexGenerator,
    audit: Option<Arc<AuditTrail>>,
    data_dir: Option<PathBuf>,
}

impl VaultgateServices {
    /// Open (or create) the databases under `data_dir`. The audit database
    /// is only opened when `config.audit_enabled` is set.
    #[instrument(skip_all, fields(path = %data_dir.as_ref().display()))]
    pub fn open(
        data_dir: impl AsRef<Path>,
        config: &VaultgateConfig,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let secrets = Arc::new(SqliteSecretRepository::open(dir.join(SECRETS_DB))?);
        let salts = Arc::new(
            SqliteSaltStore::open(dir.join(SALTS_DB))?.with_salt_len(config.blind_index.salt_len)?,
        );
        let audit = if config.audit_enabled {
            Some(Arc::new(AuditTrail::open(dir.join(AUDIT_DB))?))
        } else {
            None
        };

        let services = Self::assemble(secrets, salts, audit, config, directory)?;
        info!(audit = config.audit_enabled, "vaultgate services initialised");
        Ok(Self {
            data_dir: Some(dir.to_path_buf()),
            ..services
        })
    }

    /// Same wiring with every database in memory.
    pub fn in_memory(
        config: &VaultgateConfig,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        let secrets = Arc::new(SqliteSecretRepository::open_in_memory()?);
        let salts = Arc::new(
            SqliteSaltStore::open_in_memory()?.with_salt_len(config.blind_index.salt_len)?,
        );
        let audit = if config.audit_enabled {
            Some(Arc::new(AuditTrail::open_in_memory()?))
        } else {
            None
        };

        debug!("in-memory vaultgate services initialised");
        Self::assemble(secrets, salts, audit, config, directory)
    }

    fn assemble(
        secrets: Arc<SqliteSecretRepository>,
        salts: Arc<SqliteSaltStore>,
        audit: Option<Arc<AuditTrail>>,
        config: &VaultgateConfig,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Result<Self> {
        let blind_index = BlindIndexGenerator::from_config(salts, config)?;

        let mut dispatcher = AuthorizationDispatcher::new(
            secrets.clone(),
            Arc::new(MembershipUserValidator::new(directory)),
            Arc::new(GrantServiceAccountValidator),
            Arc::new(ScopedServiceTokenValidator::new()),
        );
        if let Some(trail) = &audit {
            dispatcher = dispatcher.with_audit(trail.clone());
        }

        Ok(Self {
            secrets,
            dispatcher,
            blind_index,
            audit,
            data_dir: None,
        })
    }

    pub fn dispatcher(&self) -> &AuthorizationDispatcher {
        &self.dispatcher
    }

    pub fn blind_index(&self) -> &BlindIndexGenerator {
        &self.blind_index
    }

    pub fn audit(&self) -> Option<&AuditTrail> {
        self.audit.as_deref()
    }

    /// `None` for in-memory services.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Store a new secret together with its blind index. The first secret
    /// stored in a workspace establishes that workspace's salt.
    #[instrument(skip_all, fields(%workspace_id, %environment))]
    pub async fn store_secret(
        &self,
        workspace_id: WorkspaceId,
        environment: &str,
        name: &str,
    ) -> Result<Secret> {
        let index = self
            .blind_index
            .create_blind_index(name, workspace_id)
            .await?;
        let secret = Secret::new(workspace_id, environment, name).with_blind_index(index);
        self.secrets.insert(&secret).await?;
        debug!(secret_id = %secret.id, "secret stored");
        Ok(secret)
    }

    /// Find a secret by name through its blind index, then authorize
    /// `context` against it.
    ///
    /// # Errors
    ///
    /// - [`VaultgateError::NotFound`] if the workspace has no salt yet or no
    ///   secret in `environment` carries the name's index.
    /// - [`VaultgateError::BadRequest`] if more than one secret matches.
    /// - Whatever [`AuthorizationDispatcher::validate_for_secret`] returns.
    #[instrument(skip_all, fields(kind = %context.kind(), %workspace_id, %environment))]
    pub async fn locate_secret(
        &self,
        context: &AuthContext,
        workspace_id: WorkspaceId,
        environment: &str,
        name: &str,
        accepted_roles: &[Role],
        required_permissions: &BTreeSet<Permission>,
    ) -> Result<Secret> {
        let index = self.blind_index.get_blind_index(name, workspace_id).await?;
        let mut matches = self
            .secrets
            .find_by_blind_index(workspace_id, environment, &index)
            .await?;

        let secret_id = match matches.len() {
            0 => {
                return Err(VaultgateError::NotFound(format!(
                    "no secret with that name in {workspace_id}/{environment}"
                )));
            }
            1 => matches.remove(0).id,
            n => {
                return Err(VaultgateError::BadRequest(format!(
                    "{n} secrets share that name in {workspace_id}/{environment}"
                )));
            }
        };

        self.dispatcher
            .validate_for_secret(context, secret_id, accepted_roles, required_permissions)
            .await
    }
}
