//! Store trait definitions

use emtrack_api::{IncubationBatch, MonitoringSession};
use emtrack_util::{BatchId, SessionId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Session snapshots

    /// Save (insert or replace) a session snapshot
    fn save_session(&self, session: &MonitoringSession) -> StoreResult<()>;

    /// Load a session snapshot by id
    fn load_session(&self, id: &SessionId) -> StoreResult<Option<MonitoringSession>>;

    /// List all stored session ids
    fn list_session_ids(&self) -> StoreResult<Vec<SessionId>>;

    // Batch snapshots

    /// Save (insert or replace) a batch snapshot
    fn save_batch(&self, batch: &IncubationBatch) -> StoreResult<()>;

    /// Load a batch snapshot by id
    fn load_batch(&self, id: &BatchId) -> StoreResult<Option<IncubationBatch>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
