//! # netprint-escpos
//!
//! ESC/POS network printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command encoding
//! - Single-byte codepage text (CP866 / WPC1251) for Cyrillic printers
//! - Raw TCP transport with completion events
//! - TCP reachability probes
//! - Image/logo processing
//!
//! Business logic (WHAT to print, WHEN, and to WHICH device) lives in
//! `netprint-fleet`.
//!
//! ## Example
//!
//! ```ignore
//! use netprint_escpos::{CharScale, Codepage, CutMode, EscPosBuilder};
//!
//! let mut builder = EscPosBuilder::new(Codepage::Cp866);
//! builder.initialize().select_codepage();
//! builder.center().scale(CharScale::DOUBLE);
//! builder.line("Чек");
//! builder.reset_size().left();
//! builder.line("Итого: 100");
//! builder.cut(CutMode::FeedAndPartial(10));
//! let bytes = builder.build();
//! ```

mod address;
mod encoding;
mod error;
mod escpos;
mod transport;

// Re-exports
pub use address::DeviceAddress;
pub use encoding::{Codepage, pad, text_width, truncate};
pub use error::{PrintError, PrintResult};
pub use escpos::{Alignment, CharScale, Command, CutMode, DrawerPin, EscPosBuilder, StatusKind};
pub use transport::{
    Probe, TcpProbe, TcpTransport, TcpTransportFactory, Transport, TransportEvent,
    TransportFactory, TransportSink,
};

#[cfg(feature = "image")]
pub use escpos::rasterize_logo;
