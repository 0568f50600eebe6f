// Copyright 2025-2026 CEMAXECUTER LLC

pub mod callback;
pub mod config;
pub mod error;
pub mod limiter;
pub mod ring;
pub mod session;
pub mod source;

pub use config::{TransferConfig, TransferMode, TransferOptions, Tuning};
pub use error::{TransferError, TransferResult};
pub use session::{SessionController, SessionReport, SessionState, StopReason};
