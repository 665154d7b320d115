//! # Core Framing Components
//!
//! Low-level wire format handling for the chunk transport.
//!
//! This module provides the foundation for the transport: the fixed 8-byte
//! chunk header and endpoint URL parsing.
//!
//! ## Components
//! - **Header**: chunk header encode/parse with length-bound validation
//! - **Endpoint**: endpoint URL parsing with default-port fallback
//!
//! ## Wire Format
//! ```text
//! [MessageType(4)] [TotalLength(4, LE)] [Body(TotalLength - 8)]
//! ```
//!
//! The total length includes the 8-byte header itself. The message type code
//! is opaque to this core; interpreting it belongs to the layer above.

pub mod endpoint;
pub mod header;

pub use endpoint::Endpoint;
pub use header::ChunkHeader;
