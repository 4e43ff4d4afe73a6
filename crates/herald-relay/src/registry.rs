use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use herald_core::ids::{ConnectionId, ExecutionId};
use herald_core::records::ConnectionRecord;
use herald_core::ValidationError;
use herald_store::row_helpers::now_timestamp;
use herald_store::ConnectionStore;

use crate::error::RegistryError;

/// Result of a disconnect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deregistered {
    /// The record for this execution was removed.
    Removed(ExecutionId),
    /// Nothing was registered for the connection. Duplicate disconnects and
    /// connections that never registered end up here.
    NotRegistered,
}

/// Applies connect and disconnect events to the connection store.
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self { store }
    }

    /// Bind `execution_id` to `connection_id`, replacing any earlier binding.
    ///
    /// A connection serves one execution: if `connection_id` was bound to a
    /// different execution, that older record is released.
    #[instrument(skip(self), fields(execution_id = %execution_id, connection_id = %connection_id))]
    pub async fn register(
        &self,
        execution_id: &ExecutionId,
        connection_id: &ConnectionId,
    ) -> Result<(), RegistryError> {
        if execution_id.as_str().trim().is_empty() {
            return Err(ValidationError::empty("executionArn").into());
        }
        if connection_id.as_str().trim().is_empty() {
            return Err(ValidationError::empty("connectionId").into());
        }

        let record = ConnectionRecord {
            execution_id: execution_id.clone(),
            connection_id: connection_id.clone(),
            registered_at: now_timestamp(),
        };

        match self.store.put(&record).await {
            Ok(Some(previous)) if previous != *connection_id => {
                info!(superseded = %previous, "execution re-registered on a new connection");
            }
            Ok(_) => debug!("connection registered"),
            Err(e) => {
                error!(error = %e, "failed to register connection");
                return Err(RegistryError::Database(e));
            }
        }

        self.release_others(execution_id, connection_id).await
    }

    /// Drop records other than `keep` that still point at `connection_id`.
    async fn release_others(
        &self,
        keep: &ExecutionId,
        connection_id: &ConnectionId,
    ) -> Result<(), RegistryError> {
        let bound = self
            .store
            .find_by_connection(connection_id)
            .await
            .map_err(|e| {
                error!(error = %e, "reverse lookup failed");
                RegistryError::Database(e)
            })?;

        for record in bound.iter().filter(|r| r.execution_id != *keep) {
            let removed = self
                .store
                .delete_if_matches(&record.execution_id, connection_id)
                .await
                .map_err(|e| {
                    error!(
                        error = %e,
                        execution_id = %record.execution_id,
                        "failed to release previous binding"
                    );
                    RegistryError::Database(e)
                })?;
            if removed {
                info!(released = %record.execution_id, "connection moved to a new execution");
            }
        }
        Ok(())
    }

    /// Remove whatever execution is bound to `connection_id`.
    ///
    /// An unknown connection is a successful no-op. If the reverse index
    /// holds more than one match, only the first (newest) is removed.
    #[instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn deregister(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Deregistered, RegistryError> {
        if connection_id.as_str().trim().is_empty() {
            return Err(ValidationError::empty("connectionId").into());
        }

        let matches = self.store.find_by_connection(connection_id).await.map_err(|e| {
            error!(error = %e, "reverse lookup failed");
            RegistryError::Database(e)
        })?;

        let Some(first) = matches.first() else {
            debug!("no execution registered for connection");
            return Ok(Deregistered::NotRegistered);
        };

        if matches.len() > 1 {
            warn!(
                matches = matches.len(),
                chosen = %first.execution_id,
                "connection id claimed by multiple executions"
            );
        }

        // Conditional on the connection id so a register that re-pointed the
        // execution since the lookup survives.
        let removed = self
            .store
            .delete_if_matches(&first.execution_id, connection_id)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    execution_id = %first.execution_id,
                    "failed to delete connection record"
                );
                RegistryError::Database(e)
            })?;

        if removed {
            info!(execution_id = %first.execution_id, "connection deregistered");
            Ok(Deregistered::Removed(first.execution_id.clone()))
        } else {
            debug!(execution_id = %first.execution_id, "record changed before delete");
            Ok(Deregistered::NotRegistered)
        }
    }

    /// The connection currently bound to `execution_id`, if any.
    pub async fn lookup(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<ConnectionId>, RegistryError> {
        self.store
            .get(execution_id)
            .await
            .map(|record| record.map(|r| r.connection_id))
            .map_err(RegistryError::Database)
    }
}
