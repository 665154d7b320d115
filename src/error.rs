//! # Error Types
//!
//! Error handling for the chunk transport core.
//!
//! This module defines all error variants that can occur while establishing
//! a connection or reading message chunks, from low-level I/O failures to
//! protocol framing violations.
//!
//! ## Error Categories
//! - **Environmental failures**: DNS resolution, connect failures, socket I/O
//!   errors. These are expected at runtime and are either surfaced from the
//!   connect call or reported through the message sink's error callback.
//! - **Protocol faults**: a peer declared a chunk length outside the valid
//!   bound. The connection is no longer trustworthy and the read loop stops.
//! - **Programmer errors**: calling into a transport in the wrong state
//!   (connecting an already-connected socket, receiving before connecting).
//!   These fail fast from the API and are never retried.
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// The primary error type for all transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The endpoint URL could not be resolved to a usable address.
    ///
    /// This is a connect-time failure and is never reported through the
    /// sink's read-error callback.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Every racing connect attempt failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// A peer declared a chunk length that cannot cover its own header's
    /// length field, or that exceeds the receive buffer capacity.
    #[error("Message size {size} bytes is out of bounds for buffer of size {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// The transport has been closed; no further reads or connects succeed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The operation is not valid in the transport's current state.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// An unexpected internal fault during read setup or completion.
    #[error("Internal transport error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TransportError {
    /// Whether this error is a protocol-level fault (as opposed to an
    /// environmental I/O failure). Protocol faults mean the byte stream can
    /// no longer be trusted to frame correctly.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(self, TransportError::MessageTooLarge { .. })
    }
}

/// Type alias for Results using TransportError
pub type Result<T> = std::result::Result<T, TransportError>;
