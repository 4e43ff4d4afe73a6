//! Inbound events for each entry point, and the validated requests they
//! become.
//!
//! Events mirror the loosely shaped JSON that arrives from the edge; every
//! field is optional so that a missing value becomes a [`ValidationError`]
//! rather than a deserialization failure with an opaque message.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::{ConnectionId, ExecutionId};

/// Transport metadata attached to connect and disconnect events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub connection_id: Option<String>,
}

impl RequestContext {
    pub fn for_connection(connection_id: &ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id.to_string()),
        }
    }
}

/// A client opened a connection and announced which execution it waits on.
///
/// `body` is the raw text the client sent, expected to be a JSON object
/// carrying `executionArn`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectEvent {
    pub body: Option<String>,
    pub request_context: Option<RequestContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectBody {
    execution_arn: Option<String>,
}

/// A client connection went away.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectEvent {
    pub request_context: Option<RequestContext>,
}

/// An execution finished (or an operator wants to push a direct message).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    pub execution_arn: Option<String>,
    pub msg_override: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub execution_id: ExecutionId,
    pub connection_id: ConnectionId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub connection_id: ConnectionId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchRequest {
    pub execution_id: ExecutionId,
    pub override_message: Option<String>,
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        None => Err(ValidationError::missing(field)),
        Some(v) if v.trim().is_empty() => Err(ValidationError::empty(field)),
        Some(v) => Ok(v.to_string()),
    }
}

fn connection_from(ctx: Option<&RequestContext>) -> Result<ConnectionId, ValidationError> {
    let raw = ctx.and_then(|c| c.connection_id.as_deref());
    required(raw, "requestContext.connectionId").map(ConnectionId::from_raw)
}

impl TryFrom<&ConnectEvent> for ConnectRequest {
    type Error = ValidationError;

    fn try_from(event: &ConnectEvent) -> Result<Self, Self::Error> {
        let raw = required(event.body.as_deref(), "body")?;
        let body: ConnectBody = serde_json::from_str(&raw)
            .map_err(|e| ValidationError::new("body", format!("malformed JSON: {e}")))?;
        let execution_arn = required(body.execution_arn.as_deref(), "executionArn")?;
        let connection_id = connection_from(event.request_context.as_ref())?;
        Ok(Self {
            execution_id: ExecutionId::from_raw(execution_arn),
            connection_id,
        })
    }
}

impl TryFrom<&DisconnectEvent> for DisconnectRequest {
    type Error = ValidationError;

    fn try_from(event: &DisconnectEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            connection_id: connection_from(event.request_context.as_ref())?,
        })
    }
}

impl TryFrom<&DispatchEvent> for DispatchRequest {
    type Error = ValidationError;

    fn try_from(event: &DispatchEvent) -> Result<Self, Self::Error> {
        let execution_arn = required(event.execution_arn.as_deref(), "executionArn")?;
        // An empty override means "no override".
        let override_message = event.msg_override.clone().filter(|m| !m.is_empty());
        Ok(Self {
            execution_id: ExecutionId::from_raw(execution_arn),
            override_message,
        })
    }
}
