//! SQLite artifact persistence.
//!
//! RULE: Only store.rs talks to the database. Modules produce payloads;
//! the engine hands them here keyed by (module_name, parameter_signature).
//!
//! Artifacts are write-once per key: re-running with the same key
//! overwrites in a single upsert statement, so readers never observe a
//! partially written payload.

use crate::error::{EngineError, EngineResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// The unit of storage the display layer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub module_name: String,
    pub parameter_signature: String,
    pub payload: serde_json::Value,
    /// RFC 3339 UTC timestamp of the write.
    pub created_at: String,
}

pub struct ArtifactStore {
    conn: Connection,
    path: Option<String>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS run_artifacts (
    module_name         TEXT NOT NULL,
    parameter_signature TEXT NOT NULL,
    payload             TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    PRIMARY KEY (module_name, parameter_signature)
);
";

impl ArtifactStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL only applies to real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database. In-memory stores get
    /// a fresh, isolated database.
    pub fn reopen(&self) -> EngineResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply the schema. Idempotent.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Upsert the artifact. The single-statement write is atomic, so the
    /// prior artifact stays readable until the replacement lands.
    pub fn put(&self, artifact: &RunArtifact) -> EngineResult<()> {
        let payload = serde_json::to_string(&artifact.payload)?;
        self.conn.execute(
            "INSERT INTO run_artifacts (module_name, parameter_signature, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (module_name, parameter_signature)
             DO UPDATE SET payload = excluded.payload, created_at = excluded.created_at",
            params![
                artifact.module_name,
                artifact.parameter_signature,
                payload,
                artifact.created_at
            ],
        )?;
        log::debug!(
            "store: put ({}, {})",
            artifact.module_name,
            artifact.parameter_signature
        );
        Ok(())
    }

    /// Fetch an artifact, or NotFound for an unused key.
    pub fn get(&self, module_name: &str, parameter_signature: &str) -> EngineResult<RunArtifact> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, created_at FROM run_artifacts
                 WHERE module_name = ?1 AND parameter_signature = ?2",
                params![module_name, parameter_signature],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((payload, created_at)) => Ok(RunArtifact {
                module_name: module_name.to_string(),
                parameter_signature: parameter_signature.to_string(),
                payload: serde_json::from_str(&payload)?,
                created_at,
            }),
            None => Err(EngineError::NotFound {
                module: module_name.to_string(),
                signature: parameter_signature.to_string(),
            }),
        }
    }

    /// All stored signatures for one module, ascending. Used by tooling.
    pub fn signatures(&self, module_name: &str) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT parameter_signature FROM run_artifacts
             WHERE module_name = ?1 ORDER BY parameter_signature",
        )?;
        let rows = stmt
            .query_map(params![module_name], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }
}
