// Copyright 2025-2026 CEMAXECUTER LLC

use std::io;
use std::time::Duration;

use hx_sdr::DeviceError;
use thiserror::Error;

pub type TransferResult<T> = Result<T, TransferError>;

/// Terminal status of a failed transfer.
///
/// A full receive ring is not an error: dropped bytes are counted and
/// reported in the session summary.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Out-of-range or conflicting options; no session was started
    #[error("argument error: {0}")]
    Config(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The device stopped delivering buffers without reporting an error
    #[error("couldn't transfer any bytes for {}s", .idle.as_secs_f32())]
    Stalled { idle: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    pub fn config(msg: impl Into<String>) -> Self {
        TransferError::Config(msg.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }

    /// Configuration errors are raised before any device is touched
    pub fn is_config(&self) -> bool {
        matches!(self, TransferError::Config(_))
    }
}
