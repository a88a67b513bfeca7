//! Fleet error types

use netprint_escpos::PrintError;
use thiserror::Error;

use crate::receipt::DecodeError;

/// Errors surfaced to callers of the fleet handle
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Fleet is not running")]
    Closed,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    InvalidAddress(#[from] PrintError),
}

pub type FleetResult<T> = Result<T, FleetError>;
