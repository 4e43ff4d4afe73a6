use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, ExecutionId};

/// Which live connection is waiting on which execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub execution_id: ExecutionId,
    pub connection_id: ConnectionId,
    pub registered_at: String,
}

/// The output of a finished execution, as written by the workflow engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub execution_id: ExecutionId,
    pub payload: serde_json::Value,
}
