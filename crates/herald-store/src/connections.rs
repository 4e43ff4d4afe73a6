use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tracing::instrument;

use herald_core::ids::{ConnectionId, ExecutionId};
use herald_core::records::ConnectionRecord;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "connections";

/// Durable execution → connection mapping with a reverse index.
///
/// Implementations guarantee atomicity per call only. Absence is reported
/// as `None` / empty, never as an error.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Upsert by execution id. Returns the connection id that was replaced,
    /// if any.
    async fn put(&self, record: &ConnectionRecord) -> Result<Option<ConnectionId>, StoreError>;

    async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ConnectionRecord>, StoreError>;

    /// Reverse lookup. Newest registration first, ties broken by execution id.
    async fn find_by_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Vec<ConnectionRecord>, StoreError>;

    /// Delete by execution id. Returns whether a record was removed.
    async fn delete(&self, execution_id: &ExecutionId) -> Result<bool, StoreError>;

    /// Delete only while the record still points at `connection_id`.
    async fn delete_if_matches(
        &self,
        execution_id: &ExecutionId,
        connection_id: &ConnectionId,
    ) -> Result<bool, StoreError>;
}

/// SQLite-backed [`ConnectionStore`].
pub struct ConnectionRepo {
    db: Database,
}

impl ConnectionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of live records.
    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM connections", [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or_default())
        })
    }
}

#[async_trait]
impl ConnectionStore for ConnectionRepo {
    #[instrument(
        skip(self, record),
        fields(execution_id = %record.execution_id, connection_id = %record.connection_id)
    )]
    async fn put(&self, record: &ConnectionRecord) -> Result<Option<ConnectionId>, StoreError> {
        self.db.with_conn(|conn| {
            let previous: Option<String> = conn
                .query_row(
                    "SELECT connection_id FROM connections WHERE execution_id = ?1",
                    [record.execution_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            conn.execute(
                "INSERT INTO connections (execution_id, connection_id, registered_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(execution_id) DO UPDATE SET
                     connection_id = excluded.connection_id,
                     registered_at = excluded.registered_at",
                rusqlite::params![
                    record.execution_id.as_str(),
                    record.connection_id.as_str(),
                    record.registered_at,
                ],
            )?;

            Ok(previous.map(ConnectionId::from_raw))
        })
    }

    #[instrument(skip(self), fields(execution_id = %execution_id))]
    async fn get(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<ConnectionRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT execution_id, connection_id, registered_at
                 FROM connections WHERE execution_id = ?1",
            )?;
            let mut rows = stmt.query([execution_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_record(row).map(Some),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self), fields(connection_id = %connection_id))]
    async fn find_by_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Vec<ConnectionRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT execution_id, connection_id, registered_at
                 FROM connections WHERE connection_id = ?1
                 ORDER BY registered_at DESC, execution_id ASC",
            )?;
            let mut rows = stmt.query([connection_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_record(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(execution_id = %execution_id))]
    async fn delete(&self, execution_id: &ExecutionId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM connections WHERE execution_id = ?1",
                [execution_id.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    #[instrument(skip(self), fields(execution_id = %execution_id, connection_id = %connection_id))]
    async fn delete_if_matches(
        &self,
        execution_id: &ExecutionId,
        connection_id: &ConnectionId,
    ) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM connections WHERE execution_id = ?1 AND connection_id = ?2",
                [execution_id.as_str(), connection_id.as_str()],
            )?;
            Ok(changed > 0)
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<ConnectionRecord, StoreError> {
    Ok(ConnectionRecord {
        execution_id: ExecutionId::from_raw(row_helpers::get::<String>(
            row,
            0,
            TABLE,
            "execution_id",
        )?),
        connection_id: ConnectionId::from_raw(row_helpers::get::<String>(
            row,
            1,
            TABLE,
            "connection_id",
        )?),
        registered_at: row_helpers::get(row, 2, TABLE, "registered_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> ConnectionRepo {
        ConnectionRepo::new(Database::in_memory().unwrap())
    }

    fn record(exec: &str, conn: &str, at: &str) -> ConnectionRecord {
        ConnectionRecord {
            execution_id: ExecutionId::from_raw(exec),
            connection_id: ConnectionId::from_raw(conn),
            registered_at: at.to_string(),
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let repo = repo();
        let previous = repo
            .put(&record("exec-1", "conn-A", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        assert!(previous.is_none());

        let found = repo.get(&ExecutionId::from_raw("exec-1")).await.unwrap().unwrap();
        assert_eq!(found.connection_id.as_str(), "conn-A");
        assert_eq!(found.registered_at, "2026-01-01T00:00:00.000000Z");
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let repo = repo();
        assert!(repo.get(&ExecutionId::from_raw("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_and_reports_previous() {
        let repo = repo();
        repo.put(&record("exec-1", "conn-A", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        let previous = repo
            .put(&record("exec-1", "conn-B", "2026-01-01T00:00:01.000000Z"))
            .await
            .unwrap();
        assert_eq!(previous, Some(ConnectionId::from_raw("conn-A")));

        let found = repo.get(&ExecutionId::from_raw("exec-1")).await.unwrap().unwrap();
        assert_eq!(found.connection_id.as_str(), "conn-B");
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn find_by_connection_orders_newest_first() {
        let repo = repo();
        repo.put(&record("exec-b", "conn-A", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        repo.put(&record("exec-c", "conn-A", "2026-01-01T00:00:05.000000Z"))
            .await
            .unwrap();
        repo.put(&record("exec-a", "conn-A", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        repo.put(&record("exec-z", "conn-Z", "2026-01-01T00:00:09.000000Z"))
            .await
            .unwrap();

        let matches = repo
            .find_by_connection(&ConnectionId::from_raw("conn-A"))
            .await
            .unwrap();
        let ids: Vec<&str> = matches.iter().map(|r| r.execution_id.as_str()).collect();
        assert_eq!(ids, vec!["exec-c", "exec-a", "exec-b"]);
    }

    #[tokio::test]
    async fn find_by_unknown_connection_is_empty() {
        let repo = repo();
        let matches = repo
            .find_by_connection(&ConnectionId::from_raw("ghost"))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let repo = repo();
        repo.put(&record("exec-1", "conn-A", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();
        assert!(repo.delete(&ExecutionId::from_raw("exec-1")).await.unwrap());
        assert!(repo.get(&ExecutionId::from_raw("exec-1")).await.unwrap().is_none());
        assert!(!repo.delete(&ExecutionId::from_raw("exec-1")).await.unwrap());
    }

    #[tokio::test]
    async fn delete_if_matches_spares_newer_registration() {
        let repo = repo();
        repo.put(&record("exec-1", "conn-B", "2026-01-01T00:00:00.000000Z"))
            .await
            .unwrap();

        let removed = repo
            .delete_if_matches(&ExecutionId::from_raw("exec-1"), &ConnectionId::from_raw("conn-A"))
            .await
            .unwrap();
        assert!(!removed);
        assert!(repo.get(&ExecutionId::from_raw("exec-1")).await.unwrap().is_some());

        let removed = repo
            .delete_if_matches(&ExecutionId::from_raw("exec-1"), &ConnectionId::from_raw("conn-B"))
            .await
            .unwrap();
        assert!(removed);
        assert_eq!(repo.count().unwrap(), 0);
    }
}
