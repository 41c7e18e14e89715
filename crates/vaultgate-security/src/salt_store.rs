// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-workspace blind-index salt storage.
//
// Schema:
//   blind_index_salts(
//     workspace_id TEXT PRIMARY KEY,   -- UUID
//     salt         BLOB NOT NULL,      -- random bytes, never rewritten
//     created_at   TEXT NOT NULL       -- RFC 3339
//   )
//
// A salt record is created once, on first use, and never mutated. Rotation
// would need a new record plus re-indexing of every secret, and is not
// supported here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::types::WorkspaceId;

use crate::blocking::run_blocking;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS blind_index_salts (
        workspace_id TEXT PRIMARY KEY,
        salt BLOB NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

/// Salt length used when a store is opened without an explicit length.
pub const DEFAULT_SALT_LEN: usize = 16;

/// Shortest salt a store will generate.
pub const MIN_SALT_LEN: usize = 8;

fn db_err(e: rusqlite::Error) -> VaultgateError {
    VaultgateError::Database(e.to_string())
}

fn check_salt_len(salt_len: usize) -> Result<usize> {
    if salt_len < MIN_SALT_LEN {
        return Err(VaultgateError::Config(format!(
            "salt length must be at least {MIN_SALT_LEN}, got {salt_len}"
        )));
    }
    Ok(salt_len)
}

/// Fill a fresh salt from the operating system CSPRNG.
pub fn generate_salt(len: usize) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| VaultgateError::Hashing("system RNG unavailable".into()))?;
    Ok(salt)
}

/// The salt a workspace derives all of its blind indexes from.
#[derive(Clone, PartialEq, Eq)]
pub struct SaltRecord {
    pub workspace_id: WorkspaceId,
    pub salt: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl SaltRecord {
    /// Short SHA-256 fingerprint, safe to put in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.salt);
        hex::encode(&digest[..8])
    }
}

// Keeps the raw salt out of `{:?}` output.
impl std::fmt::Debug for SaltRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltRecord")
            .field("workspace_id", &self.workspace_id)
            .field("salt", &self.fingerprint())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Persistence for per-workspace salts.
#[async_trait]
pub trait BlindIndexStore: Send + Sync {
    /// Return the workspace's salt, creating it on first use. Concurrent
    /// first callers must all observe the same record.
    async fn get_or_create_salt(&self, workspace_id: WorkspaceId) -> Result<SaltRecord>;

    /// Return the workspace's salt without creating one.
    async fn find_salt(&self, workspace_id: WorkspaceId) -> Result<Option<SaltRecord>>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Salt store backed by a SQLite database.
///
/// The connection sits behind a mutex and every call runs on the blocking
/// pool, so the store is cheap to share through an `Arc`.
pub struct SqliteSaltStore {
    conn: Arc<Mutex<Connection>>,
    salt_len: usize,
}

impl SqliteSaltStore {
    /// Open (or create) the salt database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("salt store opened");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory salt store opened");
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            salt_len: DEFAULT_SALT_LEN,
        }
    }

    /// Length of salts created from now on. Existing records keep theirs.
    pub fn with_salt_len(mut self, salt_len: usize) -> Result<Self> {
        self.salt_len = check_salt_len(salt_len)?;
        Ok(self)
    }
}

fn select_salt(conn: &Connection, workspace_id: WorkspaceId) -> Result<Option<SaltRecord>> {
    let row: Option<(Vec<u8>, String)> = conn
        .query_row(
            "SELECT salt, created_at FROM blind_index_salts WHERE workspace_id = ?1",
            params![workspace_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;

    let Some((salt, created_at)) = row else {
        return Ok(None);
    };

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| VaultgateError::Database(format!("bad created_at for {workspace_id}: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(SaltRecord {
        workspace_id,
        salt,
        created_at,
    }))
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| VaultgateError::Database("salt store lock poisoned".into()))
}

#[async_trait]
impl BlindIndexStore for SqliteSaltStore {
    #[instrument(skip_all, fields(%workspace_id))]
    async fn get_or_create_salt(&self, workspace_id: WorkspaceId) -> Result<SaltRecord> {
        let conn = Arc::clone(&self.conn);
        let salt_len = self.salt_len;

        run_blocking(move || {
            let conn = lock(&conn)?;
            if let Some(existing) = select_salt(&conn, workspace_id)? {
                return Ok(existing);
            }

            // OR IGNORE: another process may have won the race, in which case
            // its salt is the one every index must use.
            let salt = generate_salt(salt_len)?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO blind_index_salts (workspace_id, salt, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![workspace_id.to_string(), salt, Utc::now().to_rfc3339()],
                )
                .map_err(db_err)?;
            if inserted == 1 {
                info!(%workspace_id, "blind index salt created");
            }

            select_salt(&conn, workspace_id)?.ok_or_else(|| {
                VaultgateError::Database(format!("salt for {workspace_id} missing after insert"))
            })
        })
        .await
    }

    async fn find_salt(&self, workspace_id: WorkspaceId) -> Result<Option<SaltRecord>> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let conn = lock(&conn)?;
            select_salt(&conn, workspace_id)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local salt store with the same first-writer-wins semantics.
pub struct InMemorySaltStore {
    records: Mutex<HashMap<WorkspaceId, SaltRecord>>,
    salt_len: usize,
}

impl Default for InMemorySaltStore {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            salt_len: DEFAULT_SALT_LEN,
        }
    }
}

impl InMemorySaltStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of salts created from now on. Existing records keep theirs.
    pub fn with_salt_len(mut self, salt_len: usize) -> Result<Self> {
        self.salt_len = check_salt_len(salt_len)?;
        Ok(self)
    }

    /// Seed a record, e.g. one restored from elsewhere. An existing record for
    /// the workspace is kept.
    pub fn insert(&self, record: SaltRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| VaultgateError::Database("salt store lock poisoned".into()))?;
        records.entry(record.workspace_id).or_insert(record);
        Ok(())
    }
}

#[async_trait]
impl BlindIndexStore for InMemorySaltStore {
    async fn get_or_create_salt(&self, workspace_id: WorkspaceId) -> Result<SaltRecord> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| VaultgateError::Database("salt store lock poisoned".into()))?;

        if let Some(existing) = records.get(&workspace_id) {
            return Ok(existing.clone());
        }

        let record = SaltRecord {
            workspace_id,
            salt: generate_salt(self.salt_len)?,
            created_at: Utc::now(),
        };
        records.insert(workspace_id, record.clone());
        debug!(%workspace_id, "in-memory salt created");
        Ok(record)
    }

    async fn find_salt(&self, workspace_id: WorkspaceId) -> Result<Option<SaltRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| VaultgateError::Database("salt store lock poisoned".into()))?;
        Ok(records.get(&workspace_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_salts_differ() {
        let a = generate_salt(16).unwrap();
        let b = generate_salt(16).unwrap();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn debug_hides_raw_salt() {
        let record = SaltRecord {
            workspace_id: WorkspaceId::new(),
            salt: vec![0xAB; 16],
            created_at: Utc::now(),
        };
        let shown = format!("{record:?}");
        assert!(!shown.contains("171, 171"));
        assert!(shown.contains(&record.fingerprint()));
        assert_eq!(record.fingerprint().len(), 16);
    }

    #[tokio::test]
    async fn sqlite_salt_is_created_once() {
        let store = SqliteSaltStore::open_in_memory().unwrap();
        let ws = WorkspaceId::new();

        assert!(store.find_salt(ws).await.unwrap().is_none());

        let first = store.get_or_create_salt(ws).await.unwrap();
        let second = store.get_or_create_salt(ws).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.salt.len(), DEFAULT_SALT_LEN);
        assert_eq!(store.find_salt(ws).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn sqlite_salts_are_per_workspace() {
        let store = SqliteSaltStore::open_in_memory().unwrap();
        let a = store.get_or_create_salt(WorkspaceId::new()).await.unwrap();
        let b = store.get_or_create_salt(WorkspaceId::new()).await.unwrap();
        assert_ne!(a.salt, b.salt);
    }

    #[tokio::test]
    async fn sqlite_salt_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salts.db");
        let ws = WorkspaceId::new();

        let created = {
            let store = SqliteSaltStore::open(&path).unwrap();
            store.get_or_create_salt(ws).await.unwrap()
        };

        let reopened = SqliteSaltStore::open(&path).unwrap();
        let found = reopened.find_salt(ws).await.unwrap().unwrap();
        assert_eq!(found.salt, created.salt);
    }

    #[tokio::test]
    async fn concurrent_first_use_converges() {
        let store = Arc::new(SqliteSaltStore::open_in_memory().unwrap());
        let ws = WorkspaceId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.get_or_create_salt(ws).await.unwrap()
            }));
        }

        let mut salts = Vec::new();
        for handle in handles {
            salts.push(handle.await.unwrap().salt);
        }
        assert!(salts.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn custom_salt_len_applies_to_new_records() {
        let store = SqliteSaltStore::open_in_memory()
            .unwrap()
            .with_salt_len(32)
            .unwrap();
        let record = store.get_or_create_salt(WorkspaceId::new()).await.unwrap();
        assert_eq!(record.salt.len(), 32);

        let memory = InMemorySaltStore::new().with_salt_len(24).unwrap();
        let record = memory.get_or_create_salt(WorkspaceId::new()).await.unwrap();
        assert_eq!(record.salt.len(), 24);
    }

    #[test]
    fn short_salt_len_is_rejected_at_construction() {
        for len in [0, MIN_SALT_LEN - 1] {
            let sqlite = SqliteSaltStore::open_in_memory().unwrap().with_salt_len(len);
            assert!(matches!(sqlite, Err(VaultgateError::Config(_))));

            let memory = InMemorySaltStore::new().with_salt_len(len);
            assert!(matches!(memory, Err(VaultgateError::Config(_))));
        }
        assert!(InMemorySaltStore::new().with_salt_len(MIN_SALT_LEN).is_ok());
    }

    #[tokio::test]
    async fn find_salt_reads_back_created_record() {
        let store = SqliteSaltStore::open_in_memory().unwrap();
        let ws = WorkspaceId::new();
        let created = store.get_or_create_salt(ws).await.unwrap();
        assert_eq!(store.find_salt(ws).await.unwrap(), Some(created));
        assert!(store.find_salt(WorkspaceId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_store_keeps_first_record() {
        let store = InMemorySaltStore::new();
        let ws = WorkspaceId::new();
        let seeded = SaltRecord {
            workspace_id: ws,
            salt: vec![7; 16],
            created_at: Utc::now(),
        };
        store.insert(seeded.clone()).unwrap();
        store
            .insert(SaltRecord {
                salt: vec![9; 16],
                ..seeded.clone()
            })
            .unwrap();

        assert_eq!(store.get_or_create_salt(ws).await.unwrap(), seeded);
        assert_eq!(store.find_salt(ws).await.unwrap(), Some(seeded));
    }
}
