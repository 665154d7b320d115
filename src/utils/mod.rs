//! # Utility Modules
//!
//! Supporting utilities for the chunk transport.
//!
//! ## Components
//! - **Buffer Pool**: owner-tagged reuse pool for fixed-size chunk buffers
//!   with in-flight bracketing and take/return accounting

pub mod buffer_pool;

pub use buffer_pool::{BufferPool, PooledBuffer};
