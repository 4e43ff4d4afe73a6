//! Connection registry and result dispatch.
//!
//! The registry keeps the execution → connection mapping in step with
//! connect/disconnect events; the dispatcher pushes a finished execution's
//! result to whichever connection is registered for it. Both take their
//! store and transport as injected trait objects and hold no locks of their
//! own: all coordination is the store's per-call atomicity.

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{Delivery, DispatchOutcome, ResultDispatcher};
pub use error::{DispatchError, RegistryError};
pub use policy::{DispatchPolicy, Retention};
pub use registry::{ConnectionRegistry, Deregistered};
