// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secret lookup.
//
// The authorization core only ever reads secrets. `insert` exists on the
// concrete repositories so the write path (and tests) can populate them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info, instrument};
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::types::{BlindIndexValue, Secret, SecretId, WorkspaceId};
use vaultgate_security::run_blocking;

/// SQLite schema for the secrets table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS secrets (
        id TEXT PRIMARY KEY,
        workspace_id TEXT NOT NULL,
        environment TEXT NOT NULL,
        name TEXT NOT NULL,
        blind_index TEXT,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS secrets_blind_index
        ON secrets (workspace_id, environment, blind_index);
"#;

const SELECT_COLUMNS: &str =
    "id, workspace_id, environment, name, blind_index, version, created_at, updated_at";

/// Resolves secret identifiers to secret records.
#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn find_by_id(&self, id: SecretId) -> Result<Option<Secret>>;

    /// Every secret whose id is in `ids`. Unknown ids are silently skipped;
    /// callers compare lengths to detect them.
    async fn find_by_ids(&self, ids: &[SecretId]) -> Result<Vec<Secret>>;

    /// Secrets in one workspace environment carrying exactly `index`.
    async fn find_by_blind_index(
        &self,
        workspace_id: WorkspaceId,
        environment: &str,
        index: &BlindIndexValue,
    ) -> Result<Vec<Secret>>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Map-backed repository for tests and embedding.
#[derive(Default)]
pub struct InMemorySecretRepository {
    secrets: RwLock<HashMap<SecretId, Secret>>,
}

impl InMemorySecretRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, secret: Secret) -> Result<()> {
        self.secrets
            .write()
            .map_err(|_| VaultgateError::Database("secret map lock poisoned".into()))?
            .insert(secret.id, secret);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SecretId, Secret>>> {
        self.secrets
            .read()
            .map_err(|_| VaultgateError::Database("secret map lock poisoned".into()))
    }
}

#[async_trait]
impl SecretRepository for InMemorySecretRepository {
    async fn find_by_id(&self, id: SecretId) -> Result<Option<Secret>> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[SecretId]) -> Result<Vec<Secret>> {
        let secrets = self.read()?;
        Ok(ids.iter().filter_map(|id| secrets.get(id).cloned()).collect())
    }

    async fn find_by_blind_index(
        &self,
        workspace_id: WorkspaceId,
        environment: &str,
        index: &BlindIndexValue,
    ) -> Result<Vec<Secret>> {
        Ok(self
            .read()?
            .values()
            .filter(|s| {
                s.workspace_id == workspace_id
                    && s.environment == environment
                    && s.blind_index.as_ref() == Some(index)
            })
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

fn db_err(e: rusqlite::Error) -> VaultgateError {
    VaultgateError::Database(e.to_string())
}

/// A secrets row as stored, before id/timestamp parsing.
struct SecretRow {
    id: String,
    workspace_id: String,
    environment: String,
    name: String,
    blind_index: Option<String>,
    version: u32,
    created_at: String,
    updated_at: String,
}

impl SecretRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            environment: row.get(2)?,
            name: row.get(3)?,
            blind_index: row.get(4)?,
            version: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_secret(self) -> Result<Secret> {
        Ok(Secret {
            id: parse_stored(&self.id)?,
            workspace_id: parse_stored(&self.workspace_id)?,
            environment: self.environment,
            name: self.name,
            blind_index: self.blind_index.map(BlindIndexValue::from_encoded),
            version: self.version,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

/// Stored ids were written by us; a parse failure is corruption, not a bad
/// request.
fn parse_stored<T: std::str::FromStr>(s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| VaultgateError::Database(format!("corrupt identifier `{s}` in secrets table")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| VaultgateError::Database(format!("corrupt timestamp `{s}`: {e}")))
}

fn collect_rows<I>(rows: I) -> Result<Vec<Secret>>
where
    I: Iterator<Item = rusqlite::Result<SecretRow>>,
{
    let mut secrets = Vec::new();
    for row in rows {
        secrets.push(row.map_err(db_err)?.into_secret()?);
    }
    Ok(secrets)
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| VaultgateError::Database("secrets lock poisoned".into()))
}

/// Secret repository backed by a SQLite database.
pub struct SqliteSecretRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSecretRepository {
    /// Open (or create) the secrets database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("secrets database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory secrets database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[instrument(skip_all, fields(secret_id = %secret.id))]
    pub async fn insert(&self, secret: &Secret) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let secret = secret.clone();

        run_blocking(move || {
            lock(&conn)?
                .execute(
                    "INSERT INTO secrets (id, workspace_id, environment, name, blind_index,
                     version, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        secret.id.to_string(),
                        secret.workspace_id.to_string(),
                        secret.environment,
                        secret.name,
                        secret.blind_index.as_ref().map(|i| i.as_str().to_owned()),
                        secret.version,
                        secret.created_at.to_rfc3339(),
                        secret.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(db_err)?;
            debug!("secret inserted");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SecretRepository for SqliteSecretRepository {
    #[instrument(skip_all, fields(%id))]
    async fn find_by_id(&self, id: SecretId) -> Result<Option<Secret>> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let row = lock(&conn)?
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM secrets WHERE id = ?1"),
                    params![id.to_string()],
                    SecretRow::from_row,
                )
                .optional()
                .map_err(db_err)?;
            row.map(SecretRow::into_secret).transpose()
        })
        .await
    }

    #[instrument(skip_all, fields(requested = ids.len()))]
    async fn find_by_ids(&self, ids: &[SecretId]) -> Result<Vec<Secret>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = Arc::clone(&self.conn);
        let keys: Vec<String> = ids.iter().map(ToString::to_string).collect();

        run_blocking(move || {
            let placeholders = vec!["?"; keys.len()].join(", ");
            let conn = lock(&conn)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM secrets WHERE id IN ({placeholders})"
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params_from_iter(keys.iter()), SecretRow::from_row)
                .map_err(db_err)?;
            collect_rows(rows)
        })
        .await
    }

    #[instrument(skip_all, fields(%workspace_id, %environment))]
    async fn find_by_blind_index(
        &self,
        workspace_id: WorkspaceId,
        environment: &str,
        index: &BlindIndexValue,
    ) -> Result<Vec<Secret>> {
        let conn = Arc::clone(&self.conn);
        let environment = environment.to_owned();
        let index = index.as_str().to_owned();

        run_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM secrets
                     WHERE workspace_id = ?1 AND environment = ?2 AND blind_index = ?3"
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(
                    params![workspace_id.to_string(), environment, index],
                    SecretRow::from_row,
                )
                .map_err(db_err)?;
            collect_rows(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(workspace_id: WorkspaceId, name: &str) -> Secret {
        Secret::new(workspace_id, "prod", name)
    }

    #[tokio::test]
    async fn in_memory_find_by_ids_skips_unknown() {
        let repo = InMemorySecretRepository::new();
        let ws = WorkspaceId::new();
        let a = sample(ws, "A");
        repo.insert(a.clone()).unwrap();

        let found = repo.find_by_ids(&[a.id, SecretId::new()]).await.unwrap();
        assert_eq!(found, vec![a]);
    }

    #[tokio::test]
    async fn sqlite_round_trips_a_secret() {
        let repo = SqliteSecretRepository::open_in_memory().unwrap();
        let secret = sample(WorkspaceId::new(), "DB_PASSWORD")
            .with_blind_index(BlindIndexValue::from_encoded("aW5kZXg="));
        repo.insert(&secret).await.unwrap();

        let found = repo.find_by_id(secret.id).await.unwrap().unwrap();
        assert_eq!(found.id, secret.id);
        assert_eq!(found.workspace_id, secret.workspace_id);
        assert_eq!(found.blind_index, secret.blind_index);
        assert_eq!(found.created_at.timestamp(), secret.created_at.timestamp());

        assert!(repo.find_by_id(SecretId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_find_by_ids_returns_only_existing() {
        let repo = SqliteSecretRepository::open_in_memory().unwrap();
        let ws = WorkspaceId::new();
        let a = sample(ws, "A");
        let b = sample(ws, "B");
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        let found = repo
            .find_by_ids(&[a.id, b.id, SecretId::new()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(repo.find_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_duplicate_id_is_database_error() {
        let repo = SqliteSecretRepository::open_in_memory().unwrap();
        let secret = sample(WorkspaceId::new(), "A");
        repo.insert(&secret).await.unwrap();
        let err = repo.insert(&secret).await.unwrap_err();
        assert!(matches!(err, VaultgateError::Database(_)));
    }

    #[tokio::test]
    async fn blind_index_lookup_is_scoped_to_workspace_and_environment() {
        let repo = SqliteSecretRepository::open_in_memory().unwrap();
        let ws = WorkspaceId::new();
        let index = BlindIndexValue::from_encoded("c2FtZQ==");

        let prod = sample(ws, "A").with_blind_index(index.clone());
        let mut dev = sample(ws, "A").with_blind_index(index.clone());
        dev.environment = "dev".into();
        let elsewhere = sample(WorkspaceId::new(), "A").with_blind_index(index.clone());
        for s in [&prod, &dev, &elsewhere] {
            repo.insert(s).await.unwrap();
        }

        let found = repo.find_by_blind_index(ws, "prod", &index).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, prod.id);

        let memory = InMemorySecretRepository::new();
        for s in [prod.clone(), dev, elsewhere] {
            memory.insert(s).unwrap();
        }
        let found = memory.find_by_blind_index(ws, "prod", &index).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, prod.id);
    }

    #[tokio::test]
    async fn sqlite_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.db");
        let secret = sample(WorkspaceId::new(), "A");

        {
            let repo = SqliteSecretRepository::open(&path).unwrap();
            repo.insert(&secret).await.unwrap();
        }

        let repo = SqliteSecretRepository::open(&path).unwrap();
        assert!(repo.find_by_id(secret.id).await.unwrap().is_some());
    }
}
