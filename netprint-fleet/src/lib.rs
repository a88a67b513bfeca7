//! # netprint-fleet
//!
//! Receipt printing for a fleet of ESC/POS network printers.
//!
//! - [`receipt`]: receipt model, JSON decoding and the chunked composer
//! - [`fleet`]: per-device connections, discovery and the registry actor
//! - [`config`]: environment-driven configuration
//!
//! ## Example
//!
//! ```ignore
//! use netprint_fleet::{Fleet, FleetConfig, Selection};
//!
//! let (fleet, mut events) = Fleet::spawn_tcp(FleetConfig::from_env());
//! fleet.discover("192.168.1.50")?;
//! while let Some(address) = events.discovered_rx.recv().await {
//!     fleet.connect(Selection::One(address))?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod fleet;
pub mod logger;
pub mod receipt;

pub use config::FleetConfig;
pub use error::{FleetError, FleetResult};
pub use fleet::{
    ConnectionState, DeviceSnapshot, Fleet, FleetEvents, FleetHandle, JobRejected, Selection,
};
pub use netprint_escpos::DeviceAddress;
pub use receipt::{ReceiptComposer, ReceiptDocument};
