pub mod errors;
pub mod events;
pub mod ids;
pub mod payload;
pub mod records;
pub mod transport;

pub use errors::{TransportError, ValidationError};
pub use ids::{ConnectionId, ExecutionId};
pub use records::{ConnectionRecord, ResultRecord};
pub use transport::Transport;
