//! SQLite-based store implementation

use chrono::{DateTime, Local};
use emtrack_api::{IncubationBatch, MonitoringSession};
use emtrack_util::{BatchId, SessionId};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Session snapshots
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Incubation batch snapshots
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| Local::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn save_session(&self, session: &MonitoringSession) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(session)?;

        conn.execute(
            r#"
            INSERT INTO sessions (id, snapshot_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET snapshot_json = excluded.snapshot_json,
                          updated_at = excluded.updated_at
            "#,
            params![session.id.as_str(), json, Local::now().to_rfc3339()],
        )?;

        debug!(session_id = %session.id, "Session snapshot saved");
        Ok(())
    }

    fn load_session(&self, id: &SessionId) -> StoreResult<Option<MonitoringSession>> {
        let conn = self.conn.lock().unwrap();

        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot_json FROM sessions WHERE id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => {
                let session: MonitoringSession = serde_json::from_str(&s)?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn list_session_ids(&self) -> StoreResult<Vec<SessionId>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(id)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(SessionId::from(row?));
        }
        Ok(ids)
    }

    fn save_batch(&self, batch: &IncubationBatch) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(batch)?;

        conn.execute(
            r#"
            INSERT INTO batches (id, snapshot_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET snapshot_json = excluded.snapshot_json,
                          updated_at = excluded.updated_at
            "#,
            params![batch.id.to_string(), json, Local::now().to_rfc3339()],
        )?;

        debug!(batch_id = %batch.id, "Batch snapshot saved");
        Ok(())
    }

    fn load_batch(&self, id: &BatchId) -> StoreResult<Option<IncubationBatch>> {
        let conn = self.conn.lock().unwrap();

        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot_json FROM batches WHERE id = ?",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => {
                let batch: IncubationBatch = serde_json::from_str(&s)?;
                Ok(Some(batch))
            }
            None => Ok(None),
        }
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
