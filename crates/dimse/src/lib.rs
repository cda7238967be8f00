//! DIMSE (DICOM Message Service Element) Service Class User
//!
//! This crate sends DIMSE requests to remote nodes and correlates the
//! responses that come back, including operations that answer with a
//! stream of pending responses before a final one (C-FIND, C-MOVE, C-GET).
//!
//! # Features
//! - Timeout-bounded connection establishment, optionally from a fixed local port
//! - Per-exchange response dispatch keyed by association and message id
//! - Idle-timeout bounded exchanges that stay open while responses are pending
//! - C-ECHO, C-FIND, C-MOVE, C-GET and C-STORE entry points

pub mod association;
pub mod codec;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod operations;
pub mod scu;
pub mod types;

// Re-export commonly used types
pub use config::{DimseConfig, RemoteNode};
pub use dispatch::{DispatchBus, ExchangeKey, Subscription};
pub use error::{DimseError, Result};
pub use exchange::WaitPolicy;
pub use operations::{CFinder, CMover, CStorer};
pub use scu::{DimseScu, ScuBuilder, MESSAGE_ID_STRIDE};
pub use types::{DimseCommand, DimseRequest, DimseResponse, DimseStatus};

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;
