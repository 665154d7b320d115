//! # Chunk Transport
//!
//! TCP transport core for industrial control protocol stacks.
//!
//! This crate turns a raw bidirectional byte stream into a sequence of
//! discrete, length-prefixed message chunks, and turns an endpoint URL into
//! an established connection by racing IPv4 and IPv6 connect attempts.
//!
//! ## Components
//! - **Core**: chunk header wire format and endpoint URL parsing
//! - **Transport**: the connect race and the chunk read state machine
//! - **Utils**: owner-tagged buffer pool with in-flight bracketing
//! - **Config**: buffer sizing, connect timeout, TOML/env loading
//!
//! ## Scope
//! The core does not interpret chunk contents beyond the 8-byte header and
//! performs no encryption; decrypting payloads, reassembling multi-chunk
//! messages, and deciding reconnect policy belong to the secure-channel
//! layer that implements [`MessageSink`].
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use chunk_transport::{BufferPool, MessageSink, MessageSocket, SocketHandle, TransportConfig};
//! use chunk_transport::error::TransportError;
//!
//! struct PrintSink;
//!
//! impl MessageSink for PrintSink {
//!     fn on_message_received(&self, source: SocketHandle, chunk: &[u8]) {
//!         println!("{source}: {} byte chunk", chunk.len());
//!     }
//!     fn on_receive_error(&self, source: SocketHandle, error: TransportError) {
//!         eprintln!("{source}: {error}");
//!     }
//! }
//!
//! # async fn run() -> chunk_transport::error::Result<()> {
//! let config = TransportConfig::default();
//! let pool = BufferPool::new(config.receive_buffer_size, config.pool_capacity);
//! let socket = MessageSocket::new(Arc::new(PrintSink), pool, &config)?;
//!
//! socket.connect("opc.tcp://plc.factory.local:4840").await?;
//! socket.start_receiving()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::config::TransportConfig;
pub use crate::core::endpoint::Endpoint;
pub use crate::core::header::ChunkHeader;
pub use crate::error::{Result, TransportError};
pub use crate::transport::message_socket::{ConnectionState, MessageSocket};
pub use crate::transport::sink::{MessageSink, SocketHandle};
pub use crate::utils::buffer_pool::{BufferPool, PooledBuffer};
