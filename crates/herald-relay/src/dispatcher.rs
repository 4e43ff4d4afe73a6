use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use herald_core::ids::{ConnectionId, ExecutionId};
use herald_core::payload::{normalize_numbers, to_wire};
use herald_core::{Transport, TransportError, ValidationError};
use herald_store::{ConnectionStore, ResultStore};

use crate::error::DispatchError;
use crate::policy::{DispatchPolicy, Retention};

/// How a dispatch ended on the delivery side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The transport accepted the message.
    Delivered { connection_id: ConnectionId },
    /// No connection is registered for the execution. Not an error: the
    /// workflow can finish before any client connects.
    NoConnection,
    /// A push was attempted and the transport refused it.
    Failed {
        connection_id: ConnectionId,
        error: TransportError,
    },
}

/// The result payload plus what happened when pushing it.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    /// The effective payload, with whole-number decimals normalized.
    pub result_item: serde_json::Value,
    pub delivery: Delivery,
}

impl DispatchOutcome {
    /// Whether the transport accepted the message.
    pub fn sent(&self) -> bool {
        matches!(self.delivery, Delivery::Delivered { .. })
    }
}

/// Pushes a finished execution's result to its registered connection.
pub struct ResultDispatcher {
    connections: Arc<dyn ConnectionStore>,
    results: Arc<dyn ResultStore>,
    transport: Arc<dyn Transport>,
    policy: DispatchPolicy,
}

impl ResultDispatcher {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        results: Arc<dyn ResultStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            connections,
            results,
            transport,
            policy: DispatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Resolve the payload and the connection for `execution_id` and push.
    ///
    /// With `override_message` the payload is `{"message": override}` and
    /// the result store is not read. A missing result is an error; a missing
    /// connection or a failed push is reported in the outcome.
    #[instrument(
        skip(self, override_message),
        fields(execution_id = %execution_id, has_override = override_message.is_some())
    )]
    pub async fn dispatch(
        &self,
        execution_id: &ExecutionId,
        override_message: Option<&str>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if execution_id.as_str().trim().is_empty() {
            return Err(ValidationError::empty("executionArn").into());
        }

        let payload = match override_message {
            Some(message) => json!({ "message": message }),
            None => self
                .results
                .get(execution_id)
                .await
                .map_err(|e| {
                    error!(error = %e, "result lookup failed");
                    DispatchError::UnableToAccessDatabase(e)
                })?
                .ok_or_else(|| DispatchError::NoAvailableResults(execution_id.clone()))?
                .payload,
        };
        let result_item = normalize_numbers(payload);

        let record = self.connections.get(execution_id).await.map_err(|e| {
            error!(error = %e, "connection lookup failed");
            DispatchError::UnableToAccessDatabase(e)
        })?;

        let Some(record) = record else {
            info!("no connection registered, result not pushed");
            return Ok(DispatchOutcome {
                result_item,
                delivery: Delivery::NoConnection,
            });
        };

        let wire = to_wire(&result_item)?;
        let connection_id = record.connection_id;

        let delivery = match self.transport.push(&connection_id, wire).await {
            Ok(()) => {
                info!(connection_id = %connection_id, "result pushed");
                if self.policy.retention == Retention::ConsumeOnDelivery {
                    self.remove_record(execution_id, &connection_id, "consumed").await;
                }
                Delivery::Delivered { connection_id }
            }
            Err(err) => {
                warn!(
                    connection_id = %connection_id,
                    kind = err.kind(),
                    error = %err,
                    "push failed"
                );
                if err.is_gone() && self.policy.purge_stale_on_gone {
                    self.remove_record(execution_id, &connection_id, "stale").await;
                }
                Delivery::Failed {
                    connection_id,
                    error: err,
                }
            }
        };

        Ok(DispatchOutcome {
            result_item,
            delivery,
        })
    }

    // Post-push housekeeping. The push outcome stands whatever happens here,
    // so failures are logged rather than returned.
    async fn remove_record(
        &self,
        execution_id: &ExecutionId,
        connection_id: &ConnectionId,
        reason: &'static str,
    ) {
        match self.connections.delete_if_matches(execution_id, connection_id).await {
            Ok(true) => debug!(reason, "connection record removed"),
            Ok(false) => debug!(reason, "connection record already replaced or removed"),
            Err(e) => error!(reason, error = %e, "failed to remove connection record"),
        }
    }
}
