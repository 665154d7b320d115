//! # Message Sink
//!
//! The consumer interface for completed chunks and terminal read errors,
//! implemented by the secure-channel layer above this core.

use crate::error::TransportError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable opaque identity of one live socket, usable for diagnostics and
/// log correlation. Deliberately not the raw handle: the transport keeps
/// exclusive ownership of the socket itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl SocketHandle {
    /// Allocate the next process-unique handle.
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// Receives chunks and read errors from a transport.
///
/// Callbacks are invoked from the read loop's task; for one transport they
/// are strictly ordered and never overlap. The chunk slice passed to
/// [`on_message_received`](MessageSink::on_message_received) borrows the
/// transport's receive buffer and must not be retained past the callback;
/// implementations copy out whatever they need.
pub trait MessageSink: Send + Sync {
    /// Called with one complete chunk: the 8-byte header followed by the
    /// body, exactly as declared by the header's length field.
    fn on_message_received(&self, source: SocketHandle, chunk: &[u8]);

    /// Called once with a classified failure when the read loop stops on an
    /// error. A graceful peer close does not produce this callback.
    fn on_receive_error(&self, source: SocketHandle, error: TransportError);
}
