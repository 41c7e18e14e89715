// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vaultgate configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultgateError};

/// Largest lane count Argon2 accepts (2^24 - 1).
pub const MAX_PARALLELISM: u32 = 0x00FF_FFFF;

/// Argon2id cost parameters used to derive blind indexes.
///
/// Every index in a deployment must be derived with the same parameters,
/// otherwise equal names stop producing equal indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlindIndexParams {
    /// Working set per hash, in KiB (65536 = 64 MiB).
    pub memory_cost_kib: u32,
    /// Number of Argon2 passes.
    pub time_cost: u32,
    /// Lanes. Kept at 1 so one hash occupies one blocking thread.
    pub parallelism: u32,
    /// Raw digest length in bytes.
    pub output_len: usize,
    /// Length of freshly generated workspace salts.
    pub salt_len: usize,
}

impl Default for BlindIndexParams {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65_536,
            time_cost: 3,
            parallelism: 1,
            output_len: 32,
            salt_len: 16,
        }
    }
}

impl BlindIndexParams {
    /// Cheap parameters for unit tests and benchmarks. Never use in production.
    pub fn insecure_for_tests() -> Self {
        Self {
            memory_cost_kib: 1024,
            time_cost: 1,
            ..Self::default()
        }
    }

    /// Reject parameter combinations Argon2id cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(VaultgateError::Config(format!(
                "parallelism must be between 1 and {MAX_PARALLELISM}, got {}",
                self.parallelism
            )));
        }
        let min_memory = self.parallelism.checked_mul(8).ok_or_else(|| {
            VaultgateError::Config(format!("parallelism {} is too large", self.parallelism))
        })?;
        if self.memory_cost_kib < min_memory {
            return Err(VaultgateError::Config(format!(
                "memory_cost_kib must be at least {min_memory} for parallelism {}",
                self.parallelism
            )));
        }
        if self.time_cost == 0 {
            return Err(VaultgateError::Config("time_cost must be at least 1".into()));
        }
        if self.output_len < 4 {
            return Err(VaultgateError::Config("output_len must be at least 4".into()));
        }
        if self.salt_len < 8 {
            return Err(VaultgateError::Config("salt_len must be at least 8".into()));
        }
        Ok(())
    }
}

/// Settings for the authorization and blind-indexing subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultgateConfig {
    /// Argon2id parameters for blind indexes.
    pub blind_index: BlindIndexParams,
    /// Upper bound on blind-index hashes running at once. Each one holds
    /// `memory_cost_kib` of memory for its whole duration.
    pub max_concurrent_hashes: usize,
    /// Record every authorization decision in the audit trail.
    pub audit_enabled: bool,
}

impl Default for VaultgateConfig {
    fn default() -> Self {
        Self {
            blind_index: BlindIndexParams::default(),
            max_concurrent_hashes: 4,
            audit_enabled: true,
        }
    }
}

impl VaultgateConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write settings as pretty-printed JSON.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_hashes == 0 {
            return Err(VaultgateError::Config(
                "max_concurrent_hashes must be at least 1".into(),
            ));
        }
        self.blind_index.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_index_contract() {
        let params = BlindIndexParams::default();
        assert_eq!(params.memory_cost_kib, 65_536);
        assert_eq!(params.parallelism, 1);
        assert_eq!(params.output_len, 32);
        assert_eq!(params.salt_len, 16);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: VaultgateConfig =
            serde_json::from_str(r#"{ "max_concurrent_hashes": 2 }"#).unwrap();
        assert_eq!(config.max_concurrent_hashes, 2);
        assert_eq!(config.blind_index, BlindIndexParams::default());
        assert!(config.audit_enabled);
    }

    #[test]
    fn zero_permits_rejected() {
        let config = VaultgateConfig {
            max_concurrent_hashes: 0,
            ..VaultgateConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultgateError::Config(_))));
    }

    #[test]
    fn memory_below_argon2_minimum_rejected() {
        let params = BlindIndexParams {
            memory_cost_kib: 4,
            ..BlindIndexParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn oversized_parallelism_in_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vaultgate.json");
        std::fs::write(&path, r#"{ "blind_index": { "parallelism": 4294967295 } }"#).unwrap();

        let result = VaultgateConfig::load(&path);
        assert!(matches!(result, Err(VaultgateError::Config(_))));

        let params = BlindIndexParams {
            parallelism: MAX_PARALLELISM + 1,
            memory_cost_kib: u32::MAX,
            ..BlindIndexParams::default()
        };
        assert!(matches!(params.validate(), Err(VaultgateError::Config(_))));
    }

    #[test]
    fn max_parallelism_needs_matching_memory() {
        let params = BlindIndexParams {
            parallelism: MAX_PARALLELISM,
            ..BlindIndexParams::default()
        };
        assert!(matches!(params.validate(), Err(VaultgateError::Config(_))));
    }

    #[test]
    fn load_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vaultgate.json");

        let config = VaultgateConfig {
            blind_index: BlindIndexParams::insecure_for_tests(),
            max_concurrent_hashes: 8,
            audit_enabled: false,
        };
        config.persist(&path).unwrap();

        let loaded = VaultgateConfig::load(&path).unwrap();
        assert_eq!(loaded.blind_index, config.blind_index);
        assert_eq!(loaded.max_concurrent_hashes, 8);
        assert!(!loaded.audit_enabled);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = VaultgateConfig::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(VaultgateError::Io(_))));
    }
}
