//! Receipt model, layout and composition

pub mod composer;
pub mod layout;
pub mod model;
pub mod profile;

pub use composer::{Chunk, ReceiptComposer};
pub use model::{
    DecodeError, FieldValue, LabeledValue, ReceiptDocument, ReceiptHeader, ReceiptItem,
    ReceiptTotals,
};
pub use profile::{Language, LanguageProfile, PrinterProfile, ReceiptLabels, SetupProfile};
