//! # Transport Layer
//!
//! The chunk transport core: connection establishment and the chunk read
//! loop over a raw TCP stream.
//!
//! ## Responsibilities
//! - Resolve an endpoint URL and race IPv4/IPv6 connect attempts
//! - Reassemble length-prefixed chunks from the byte stream
//! - Deliver completed chunks (and classified read errors) to a message sink
//! - Provide idempotent forced close safe from any thread
//!
//! Everything above the 8-byte chunk header is opaque here; decryption,
//! chunk reassembly into application messages, and reconnect policy belong
//! to the secure-channel layer that implements [`sink::MessageSink`].

pub mod connector;
pub mod message_socket;
pub mod sink;

pub use message_socket::{ConnectionState, MessageSocket};
pub use sink::{MessageSink, SocketHandle};
