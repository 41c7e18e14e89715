// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blind indexes: Argon2id(secret name, workspace salt), base64-encoded.
//
// The salt is fixed per workspace and read from the salt store, so equal
// names in one workspace always produce equal indexes.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};
use vaultgate_core::config::{BlindIndexParams, VaultgateConfig};
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::types::{BlindIndexValue, WorkspaceId};

use crate::salt_store::{BlindIndexStore, SaltRecord};

/// Build the Argon2id context for `params`.
fn argon2_for(params: &BlindIndexParams) -> Result<Argon2<'static>> {
    let argon_params = Params::new(
        params.memory_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(params.output_len),
    )
    .map_err(|e| VaultgateError::Config(format!("Argon2 params error: {e}")))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params))
}

/// Hash `name` with `salt` and return the raw digest.
///
/// Synchronous and expensive: call it from a blocking thread.
pub fn hash_name(params: &BlindIndexParams, name: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
    let argon2 = argon2_for(params)?;
    let mut digest = vec![0u8; params.output_len];
    argon2
        .hash_password_into(name, salt, &mut digest)
        .map_err(|e| VaultgateError::Hashing(e.to_string()))?;
    Ok(digest)
}

/// Derives blind indexes for secret names.
///
/// Concurrent hashes are capped by a semaphore because each one holds
/// `memory_cost_kib` of memory until it finishes.
#[derive(Clone)]
pub struct BlindIndexGenerator {
    store: Arc<dyn BlindIndexStore>,
    params: BlindIndexParams,
    permits: Arc<Semaphore>,
}

impl BlindIndexGenerator {
    pub fn new(
        store: Arc<dyn BlindIndexStore>,
        params: BlindIndexParams,
        max_concurrent_hashes: usize,
    ) -> Result<Self> {
        params.validate()?;
        argon2_for(&params)?;
        if max_concurrent_hashes == 0 {
            return Err(VaultgateError::Config(
                "max_concurrent_hashes must be at least 1".into(),
            ));
        }

        Ok(Self {
            store,
            params,
            permits: Arc::new(Semaphore::new(max_concurrent_hashes)),
        })
    }

    pub fn from_config(store: Arc<dyn BlindIndexStore>, config: &VaultgateConfig) -> Result<Self> {
        Self::new(store, config.blind_index, config.max_concurrent_hashes)
    }

    pub fn params(&self) -> &BlindIndexParams {
        &self.params
    }

    /// Compute the index to store alongside a new or renamed secret.
    ///
    /// Establishes the workspace salt on first use.
    #[instrument(skip_all, fields(%workspace_id))]
    pub async fn create_blind_index(
        &self,
        secret_name: &str,
        workspace_id: WorkspaceId,
    ) -> Result<BlindIndexValue> {
        check_name(secret_name)?;
        let record = self.store.get_or_create_salt(workspace_id).await?;
        debug!(salt = %record.fingerprint(), "salt resolved");
        self.derive(secret_name, &record).await
    }

    /// Compute the index to search for. Never creates a salt: a workspace
    /// without one has no indexed secrets, so this fails with `NotFound`.
    #[instrument(skip_all, fields(%workspace_id))]
    pub async fn get_blind_index(
        &self,
        secret_name: &str,
        workspace_id: WorkspaceId,
    ) -> Result<BlindIndexValue> {
        check_name(secret_name)?;
        let record = self.store.find_salt(workspace_id).await?.ok_or_else(|| {
            VaultgateError::NotFound(format!(
                "blind indexing is not enabled for workspace {workspace_id}"
            ))
        })?;
        self.derive(secret_name, &record).await
    }

    /// Hash `secret_name` with an already-resolved salt record.
    pub async fn derive(&self, secret_name: &str, record: &SaltRecord) -> Result<BlindIndexValue> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| VaultgateError::Hashing("hashing pool closed".into()))?;

        let params = self.params;
        let name = secret_name.as_bytes().to_vec();
        let salt = record.salt.clone();

        // The permit moves into the blocking task so the memory bound holds
        // even when the caller stops waiting.
        let digest = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hash_name(&params, &name, &salt)
        })
        .await
        .map_err(|e| VaultgateError::Hashing(format!("hashing task failed: {e}")))??;

        Ok(BlindIndexValue::from_encoded(STANDARD.encode(digest)))
    }
}

fn check_name(secret_name: &str) -> Result<()> {
    if secret_name.is_empty() {
        return Err(VaultgateError::BadRequest("secret name is empty".into()));
    }
    Ok(())
}
