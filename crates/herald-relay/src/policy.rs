use serde::{Deserialize, Serialize};

/// What happens to a connection record after a successful push.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Keep the record. A duplicate completion event re-notifies the client.
    #[default]
    Retain,
    /// Remove the record once the result has been pushed.
    ConsumeOnDelivery,
}

/// Record housekeeping performed by the dispatcher.
///
/// Removals always use a conditional delete keyed on the connection that was
/// pushed to, so a registration that arrived in the meantime is left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchPolicy {
    pub retention: Retention,
    /// Remove the record when the transport reports the connection gone.
    pub purge_stale_on_gone: bool,
}
