// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail: append-only SQLite log of every authorization decision.
//
// Schema:
//   authz_audit(
//     id             INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp      TEXT    NOT NULL,   -- RFC 3339
//     operation      TEXT    NOT NULL,   -- "validate_secret" | "validate_secrets"
//     principal_kind TEXT    NOT NULL,   -- "user", "serviceToken", ...
//     principal_id   TEXT    NOT NULL,
//     secret_id      TEXT    NOT NULL,   -- the identifier as requested
//     allowed        INTEGER NOT NULL,   -- 0 = denied/failed, 1 = granted
//     details        TEXT                -- failure message, if any
//   )

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use vaultgate_core::error::{Result, VaultgateError};
use vaultgate_core::principal::PrincipalKind;
use vaultgate_core::types::SecretId;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS authz_audit (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp      TEXT    NOT NULL,
        operation      TEXT    NOT NULL,
        principal_kind TEXT    NOT NULL,
        principal_id   TEXT    NOT NULL,
        secret_id      TEXT    NOT NULL,
        allowed        INTEGER NOT NULL,
        details        TEXT
    );
    CREATE INDEX IF NOT EXISTS authz_audit_secret ON authz_audit (secret_id);
"#;

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

fn db_err(e: rusqlite::Error) -> VaultgateError {
    VaultgateError::Database(e.to_string())
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One decision to append, as produced by the dispatcher.
#[derive(Debug, Clone)]
pub struct Decision<'a> {
    pub operation: &'a str,
    pub principal_kind: PrincipalKind,
    pub principal_id: &'a str,
    pub secret_ids: &'a [SecretId],
    pub allowed: bool,
    pub details: Option<&'a str>,
}

/// A single row of the audit trail, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub operation: String,
    pub principal_kind: String,
    pub principal_id: String,
    pub secret_id: String,
    pub allowed: bool,
    pub details: Option<String>,
}

/// Append-only audit trail backed by a SQLite database.
///
/// A decision over N secrets is written as N rows in one transaction, so a
/// batch never shows up half-recorded.
pub struct AuditTrail {
    conn: Mutex<Connection>,
}

impl AuditTrail {
    /// Open (or create) the audit database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit trail opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit trail opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultgateError::Database("audit trail lock poisoned".into()))
    }

    /// Append one row per secret in `decision`.
    #[instrument(skip_all, fields(operation = decision.operation, allowed = decision.allowed))]
    pub fn record(&self, decision: &Decision<'_>) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339();
        let allowed_int: i32 = if decision.allowed { 1 } else { 0 };

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO authz_audit
                     (timestamp, operation, principal_kind, principal_id, secret_id, allowed, details)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(db_err)?;

            for secret_id in decision.secret_ids {
                stmt.execute(params![
                    timestamp,
                    decision.operation,
                    decision.principal_kind.as_str(),
                    decision.principal_id,
                    secret_id.to_string(),
                    allowed_int,
                    decision.details,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;

        debug!(rows = decision.secret_ids.len(), "audit decision recorded");
        Ok(())
    }

    /// All rows for a secret, oldest first.
    pub fn entries_for_secret(&self, secret_id: SecretId) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, operation, principal_kind, principal_id, secret_id, allowed, details
                 FROM authz_audit
                 WHERE secret_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![secret_id.to_string()], row_to_entry)
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// The most recent `limit` rows, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, operation, principal_kind, principal_id, secret_id, allowed, details
                 FROM authz_audit
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map(params![limit], row_to_entry).map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        self.lock()?
            .query_row("SELECT COUNT(*) FROM authz_audit", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        operation: row.get(2)?,
        principal_kind: row.get(3)?,
        principal_id: row.get(4)?,
        secret_id: row.get(5)?,
        allowed: row.get::<_, i32>(6)? != 0,
        details: row.get(7)?,
    })
}
