//! Entry points: one per inbound event kind.
//!
//! Each takes the raw event, validates it into a typed request and hands it
//! to the registry or dispatcher. Response shapes are what the edge expects.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use herald_core::events::{
    ConnectEvent, ConnectRequest, DisconnectEvent, DisconnectRequest, DispatchEvent,
    DispatchRequest,
};
use herald_core::ids::ConnectionId;

use crate::dispatcher::{Delivery, DispatchOutcome, ResultDispatcher};
use crate::error::{DispatchError, RegistryError};
use crate::registry::{ConnectionRegistry, Deregistered};

/// Reply to a connect event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub status_code: u16,
    pub body: String,
}

impl ConnectResponse {
    pub fn connected() -> Self {
        Self {
            status_code: 200,
            body: "Connected".into(),
        }
    }

    pub fn failed(detail: &str) -> Self {
        Self {
            status_code: 500,
            body: format!(
                "Error on connect. Check that the body is JSON with an executionArn field. \
                 Details: {detail}"
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Why a push was attempted but not delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub connection_id: ConnectionId,
    pub kind: String,
    pub message: String,
}

/// Reply to a dispatch event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub result_item: serde_json::Value,
    pub sent_item: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<DeliveryFailure>,
}

impl From<DispatchOutcome> for DispatchResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        let sent_item = outcome.sent();
        let delivery_error = match outcome.delivery {
            Delivery::Failed { connection_id, error } => Some(DeliveryFailure {
                connection_id,
                kind: error.kind().to_string(),
                message: error.to_string(),
            }),
            Delivery::Delivered { .. } | Delivery::NoConnection => None,
        };
        Self {
            result_item: outcome.result_item,
            sent_item,
            delivery_error,
        }
    }
}

/// Register the connection for the execution named in the event body.
///
/// Every failure collapses into a 500-style response; the cause is logged.
pub async fn connect(registry: &ConnectionRegistry, event: &ConnectEvent) -> ConnectResponse {
    let request = match ConnectRequest::try_from(event) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejected connect event");
            return ConnectResponse::failed(&e.to_string());
        }
    };

    match registry
        .register(&request.execution_id, &request.connection_id)
        .await
    {
        Ok(()) => ConnectResponse::connected(),
        Err(e) => {
            error!(kind = e.error_kind(), error = %e, "connect failed");
            ConnectResponse::failed(&e.to_string())
        }
    }
}

/// Drop whatever execution the disconnecting connection was bound to.
pub async fn disconnect(
    registry: &ConnectionRegistry,
    event: &DisconnectEvent,
) -> Result<(), RegistryError> {
    let request = DisconnectRequest::try_from(event)?;
    match registry.deregister(&request.connection_id).await? {
        Deregistered::Removed(execution_id) => {
            info!(
                connection_id = %request.connection_id,
                execution_id = %execution_id,
                "disconnect handled"
            );
        }
        Deregistered::NotRegistered => {}
    }
    Ok(())
}

/// Push the execution's result (or the override message) to its connection.
pub async fn dispatch(
    dispatcher: &ResultDispatcher,
    event: &DispatchEvent,
) -> Result<DispatchResponse, DispatchError> {
    let request = DispatchRequest::try_from(event)?;
    let outcome = dispatcher
        .dispatch(&request.execution_id, request.override_message.as_deref())
        .await?;
    Ok(outcome.into())
}
