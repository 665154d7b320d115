//! # Buffer Pool
//!
//! Object pool for chunk receive buffers to avoid per-message allocation
//! churn in high-throughput scenarios.
//!
//! Buffers are checked out with an owner tag (for diagnostics) and returned
//! to the pool automatically on drop. While an asynchronous receive holds a
//! reference to a buffer, the buffer is marked in flight via
//! [`PooledBuffer::mark_in_flight`]; returning or re-marking a buffer that
//! is still in flight is a programming error and panics rather than
//! silently corrupting bytes an outstanding operation may still write.
//!
//! The pool keeps running take/return counters so callers can assert that
//! every checkout is balanced by exactly one return.
//!
//! ## Usage
//! ```rust
//! use chunk_transport::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(4096, 8); // 8 pre-allocated 4KB buffers
//! let mut buffer = pool.take(4096, "example");
//! buffer[0] = 42;
//! drop(buffer); // returned to the pool
//! assert_eq!(pool.taken(), pool.returned());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

struct PoolInner {
    /// Capacity of buffers kept for reuse; larger requests are served with
    /// one-off allocations that are not pooled on return.
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
    taken: AtomicUsize,
    returned: AtomicUsize,
}

/// Thread-safe reuse pool for fixed-size byte buffers.
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool of `capacity` pre-allocated buffers of `buffer_size`
    /// bytes each.
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        let mut free = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            free.push(vec![0u8; buffer_size]);
        }

        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                free: Mutex::new(free),
                taken: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out a buffer of `size` bytes, tagged with `owner` for
    /// diagnostics. Allocates when the pool is empty or `size` exceeds the
    /// pooled buffer capacity.
    pub fn take(&self, size: usize, owner: &'static str) -> PooledBuffer {
        let mut data = if size <= self.inner.buffer_size {
            let recycled = match self.inner.free.lock() {
                Ok(mut free) => free.pop(),
                Err(_) => None,
            };
            recycled.unwrap_or_else(|| vec![0u8; self.inner.buffer_size])
        } else {
            vec![0u8; size]
        };
        data.resize(size, 0);

        self.inner.taken.fetch_add(1, Ordering::Relaxed);
        trace!(owner, size, "buffer checked out");

        PooledBuffer {
            data,
            owner,
            in_flight: false,
            pool: self.inner.clone(),
        }
    }

    /// Number of buffers currently available for reuse.
    pub fn available(&self) -> usize {
        self.inner.free.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Total number of successful `take` calls.
    pub fn taken(&self) -> usize {
        self.inner.taken.load(Ordering::Relaxed)
    }

    /// Total number of buffers returned so far.
    pub fn returned(&self) -> usize {
        self.inner.returned.load(Ordering::Relaxed)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// A checked-out buffer that returns itself to the pool when dropped.
pub struct PooledBuffer {
    data: Vec<u8>,
    owner: &'static str,
    in_flight: bool,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Mark the buffer as referenced by an outstanding asynchronous
    /// operation.
    ///
    /// # Panics
    /// Panics if the buffer is already marked, which means a second
    /// operation was issued against a buffer the first has not released.
    pub fn mark_in_flight(&mut self) {
        assert!(
            !self.in_flight,
            "buffer '{}' is already referenced by an outstanding operation",
            self.owner
        );
        self.in_flight = true;
    }

    /// Clear the in-flight mark once the operation has completed, whether it
    /// succeeded or failed.
    ///
    /// # Panics
    /// Panics if the buffer was not marked.
    pub fn clear_in_flight(&mut self) {
        assert!(
            self.in_flight,
            "buffer '{}' was not marked in flight",
            self.owner
        );
        self.in_flight = false;
    }

    /// The owner tag supplied at checkout.
    pub fn owner(&self) -> &'static str {
        self.owner
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        assert!(
            !self.in_flight,
            "buffer '{}' returned to the pool while still in flight",
            self.owner
        );

        self.pool.returned.fetch_add(1, Ordering::Relaxed);
        trace!(owner = self.owner, "buffer returned");

        // only recycle buffers that match the pooled capacity
        if self.data.capacity() >= self.pool.buffer_size {
            let mut data = std::mem::take(&mut self.data);
            data.clear();
            data.resize(self.pool.buffer_size, 0);
            if let Ok(mut free) = self.pool.free.lock() {
                free.push(data);
            }
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}
