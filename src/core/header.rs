//! # Chunk Header
//!
//! Encode and parse the fixed 8-byte chunk header.
//!
//! The header carries a 4-byte message type code (opaque to this core) and a
//! 4-byte little-endian total chunk length. The length includes the header
//! itself, so the smallest well-formed value is greater than the length
//! field's own offset.
//!
//! ## Security
//! - The declared length is validated against the receive buffer capacity
//!   before any body byte is accepted, so a corrupt or malicious peer cannot
//!   force unbounded buffering.

use crate::config::{HEADER_SIZE, LENGTH_FIELD_OFFSET};
use crate::error::{Result, TransportError};
use bytes::{Buf, BufMut, BytesMut};

/// The fixed header at the front of every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Opaque message type code; interpreted by the layer above.
    pub message_type: u32,
    /// Total chunk length in bytes, including this 8-byte header.
    pub message_size: u32,
}

impl ChunkHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TransportError::Internal(format!(
                "header requires {HEADER_SIZE} bytes, got {}",
                buf.len()
            )));
        }

        let mut cursor = &buf[..HEADER_SIZE];
        let message_type = cursor.get_u32_le();
        let message_size = cursor.get_u32_le();

        Ok(Self {
            message_type,
            message_size,
        })
    }

    /// Append the encoded header to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE);
        buf.put_u32_le(self.message_type);
        buf.put_u32_le(self.message_size);
    }

    /// Encode into a standalone array, convenient for peers writing chunks.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..LENGTH_FIELD_OFFSET].copy_from_slice(&self.message_type.to_le_bytes());
        bytes[LENGTH_FIELD_OFFSET..].copy_from_slice(&self.message_size.to_le_bytes());
        bytes
    }

    /// Validate the declared length against the receive buffer capacity.
    ///
    /// A length is acceptable when it is larger than the length field's
    /// offset and no larger than `max`. Anything else is a protocol fault:
    /// the stream can no longer be trusted to frame correctly.
    pub fn validate_size(&self, max: usize) -> Result<()> {
        let size = self.message_size as usize;

        if size <= LENGTH_FIELD_OFFSET || size > max {
            return Err(TransportError::MessageTooLarge { size, max });
        }

        Ok(())
    }
}
