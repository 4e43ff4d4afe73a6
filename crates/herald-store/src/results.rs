use async_trait::async_trait;
use tracing::instrument;

use herald_core::ids::ExecutionId;
use herald_core::records::ResultRecord;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "results";

/// Read-only view of execution results owned by the workflow engine.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ResultRecord>, StoreError>;
}

/// SQLite-backed [`ResultStore`].
///
/// `put` is the workflow engine's side of the table. The relay itself only
/// reads through the [`ResultStore`] trait.
pub struct ResultRepo {
    db: Database,
}

impl ResultRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record (or replace) the result of an execution.
    #[instrument(skip(self, payload), fields(execution_id = %execution_id))]
    pub fn put(
        &self,
        execution_id: &ExecutionId,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(payload)?;
        let now = row_helpers::now_timestamp();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO results (execution_id, payload, completed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(execution_id) DO UPDATE SET
                     payload = excluded.payload,
                     completed_at = excluded.completed_at",
                rusqlite::params![execution_id.as_str(), raw, now],
            )?;
            Ok(())
        })
    }
}

#[async_trait]
impl ResultStore for ResultRepo {
    #[instrument(skip(self), fields(execution_id = %execution_id))]
    async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ResultRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT execution_id, payload FROM results WHERE execution_id = ?1")?;
            let mut rows = stmt.query([execution_id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let id: String = row_helpers::get(row, 0, TABLE, "execution_id")?;
            let raw: String = row_helpers::get(row, 1, TABLE, "payload")?;
            Ok(Some(ResultRecord {
                execution_id: ExecutionId::from_raw(id),
                payload: row_helpers::parse_json(&raw, TABLE, "payload")?,
            }))
        })
    }
}
