//! Device fleet: connections, discovery and the registry actor

pub mod connection;
pub mod discovery;
mod message;
pub mod registry;
pub mod testing;

pub use connection::{ConnectionState, DeviceConnection, DeviceSnapshot, JobRejected};
pub use message::Selection;
pub use registry::{Fleet, FleetEvents, FleetHandle};
