//! # Message Socket
//!
//! The transport instance for one logical connection: it owns the socket,
//! drives the chunk read loop, and reports completed chunks or classified
//! failures to the bound [`MessageSink`].
//!
//! ## Responsibilities
//! - Establish the connection via the dual-stack connect race
//! - Reassemble the 8-byte header and variable-length body into one
//!   contiguous pooled buffer, one chunk at a time
//! - Deliver completed chunks to the sink as borrowed views
//! - Provide idempotent forced close safe from any thread
//!
//! ## Locking
//! Three independently scoped locks keep the completion contexts apart:
//! the **lifecycle lock** guards the connection state and socket identity,
//! the **read-path lock** guards the receive cursor and is held across the
//! whole read loop so no two receives are ever concurrently in flight, and
//! the **sink lock** guards only the sink reference swap. A forced close
//! never blocks on the read path: it cancels, and whichever side holds the
//! cursor releases the buffer and socket.

use crate::config::{TransportConfig, HEADER_SIZE};
use crate::core::endpoint::Endpoint;
use crate::core::header::ChunkHeader;
use crate::error::{Result, TransportError};
use crate::transport::connector;
use crate::transport::sink::{MessageSink, SocketHandle};
use crate::utils::buffer_pool::{BufferPool, PooledBuffer};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Connection lifecycle of a [`MessageSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

struct Lifecycle {
    state: ConnectionState,
    handle: Option<SocketHandle>,
}

/// Progress through the chunk currently being assembled. Present only
/// behind the read-path lock.
struct ReadCursor {
    stream: Option<TcpStream>,
    buffer: Option<PooledBuffer>,
    bytes_received: usize,
    bytes_to_receive: usize,
    /// `-1` until the header is complete, then the declared total chunk
    /// length (header included).
    incoming_message_size: i64,
}

struct Shared {
    sink: Mutex<Arc<dyn MessageSink>>,
    pool: BufferPool,
    receive_buffer_size: usize,
    connect_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
    cursor: Arc<AsyncMutex<ReadCursor>>,
    cancel: CancellationToken,
}

impl Shared {
    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone the sink currently in effect. Callbacks are invoked on the
    /// clone, so a swap is visible to the very next delivery.
    fn current_sink(&self) -> Arc<dyn MessageSink> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Reads length-prefixed message chunks over a TCP socket.
///
/// Cloning is cheap and yields another handle to the same transport, which
/// is how `close()` is made callable from unrelated threads while a read
/// is in flight.
#[derive(Clone)]
pub struct MessageSocket {
    shared: Arc<Shared>,
}

impl MessageSocket {
    /// Creates an unconnected transport bound to `sink` and `pool`.
    pub fn new(
        sink: Arc<dyn MessageSink>,
        pool: BufferPool,
        config: &TransportConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                sink: Mutex::new(sink),
                pool,
                receive_buffer_size: config.receive_buffer_size,
                connect_timeout: config.connect_timeout,
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectionState::Unconnected,
                    handle: None,
                }),
                cursor: Arc::new(AsyncMutex::new(ReadCursor {
                    stream: None,
                    buffer: None,
                    bytes_received: 0,
                    bytes_to_receive: 0,
                    incoming_message_size: -1,
                })),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Attaches a transport to an already-connected socket, as a server
    /// does with an accepted connection.
    pub fn from_stream(
        sink: Arc<dyn MessageSink>,
        stream: TcpStream,
        pool: BufferPool,
        config: &TransportConfig,
    ) -> Result<Self> {
        let socket = Self::new(sink, pool, config)?;

        {
            let mut lifecycle = socket.shared.lock_lifecycle();
            lifecycle.state = ConnectionState::Connected;
            lifecycle.handle = Some(SocketHandle::next());
        }
        // the cursor lock is uncontended here: no loop can be running yet
        if let Ok(mut cursor) = socket.shared.cursor.try_lock() {
            cursor.stream = Some(stream);
        }

        Ok(socket)
    }

    /// Stable opaque identity of the active socket, for diagnostics.
    /// `None` until connected and after close.
    pub fn handle(&self) -> Option<SocketHandle> {
        self.shared.lock_lifecycle().handle
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock_lifecycle().state
    }

    /// Changes the sink used to report reads.
    ///
    /// The swap is visible to the very next callback: a delivery in flight
    /// when the swap occurs goes to whichever sink is installed at the
    /// instant the callback actually fires.
    pub fn change_sink(&self, sink: Arc<dyn MessageSink>) {
        match self.shared.sink.lock() {
            Ok(mut guard) => *guard = sink,
            Err(poisoned) => *poisoned.into_inner() = sink,
        }
    }

    /// Connects to an endpoint URL, racing IPv4 and IPv6 candidates.
    ///
    /// Exactly one winning socket is promoted; every other attempt is
    /// disposed. Fails with [`TransportError::InvalidState`] when the
    /// transport is already connected or connecting, and with
    /// [`TransportError::ConnectionClosed`] after a forced close.
    pub async fn connect(&self, endpoint_url: &str) -> Result<()> {
        {
            let mut lifecycle = self.shared.lock_lifecycle();
            match lifecycle.state {
                ConnectionState::Unconnected => lifecycle.state = ConnectionState::Connecting,
                ConnectionState::Closed => return Err(TransportError::ConnectionClosed),
                ConnectionState::Connecting | ConnectionState::Connected => {
                    return Err(TransportError::InvalidState("the socket is already connected"))
                }
            }
        }

        let endpoint = match Endpoint::parse(endpoint_url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.abort_connecting();
                return Err(e);
            }
        };

        debug!(%endpoint, "connecting");

        let raced = connector::connect_race(
            &endpoint,
            self.shared.connect_timeout,
            &self.shared.cancel,
        )
        .await;

        match raced {
            Ok(stream) => {
                let mut cursor = self.shared.cursor.lock().await;
                let mut lifecycle = self.shared.lock_lifecycle();

                // a forced close may have raced the promotion
                if lifecycle.state != ConnectionState::Connecting {
                    drop(lifecycle);
                    drop(cursor);
                    drop(stream);
                    return Err(TransportError::ConnectionClosed);
                }

                let handle = SocketHandle::next();
                lifecycle.state = ConnectionState::Connected;
                lifecycle.handle = Some(handle);
                cursor.stream = Some(stream);

                debug!(%handle, %endpoint, "connected");
                Ok(())
            }
            Err(e) => {
                self.abort_connecting();
                Err(e)
            }
        }
    }

    fn abort_connecting(&self) {
        let mut lifecycle = self.shared.lock_lifecycle();
        if lifecycle.state == ConnectionState::Connecting {
            lifecycle.state = ConnectionState::Unconnected;
        }
    }

    /// Starts reading chunks from the socket.
    ///
    /// The read loop runs until a forced close, a graceful peer close, or a
    /// fatal read error; at most one loop runs per transport.
    pub fn start_receiving(&self) -> Result<()> {
        {
            let lifecycle = self.shared.lock_lifecycle();
            match lifecycle.state {
                ConnectionState::Connected => {}
                ConnectionState::Closed => return Err(TransportError::ConnectionClosed),
                _ => return Err(TransportError::InvalidState("the socket is not connected")),
            }
        }

        // the read-path lock is held for the loop's whole lifetime, so a
        // second call observes it and fails fast
        let cursor = self
            .shared
            .cursor
            .clone()
            .try_lock_owned()
            .map_err(|_| TransportError::InvalidState("a receive loop is already running"))?;

        if cursor.stream.is_none() {
            return Err(TransportError::InvalidState("the socket is not connected"));
        }

        tokio::spawn(read_loop(self.shared.clone(), cursor));
        Ok(())
    }

    /// Forcefully closes the socket.
    ///
    /// Idempotent and callable from any thread, including during an
    /// in-flight connect race or read: outstanding I/O is aborted via
    /// cancellation and whichever side holds the read path releases the
    /// buffer and disposes the socket. Afterwards every read or connect
    /// attempt fails fast with an invalid-state condition.
    pub fn close(&self) {
        {
            let mut lifecycle = self.shared.lock_lifecycle();
            if lifecycle.state == ConnectionState::Closed {
                return;
            }
            lifecycle.state = ConnectionState::Closed;
            lifecycle.handle = None;
        }

        // abort the connect race and any in-flight receive
        self.shared.cancel.cancel();

        // when no receive loop holds the read path, dispose inline;
        // otherwise the loop's cancellation arm shuts the socket down and
        // releases the buffer
        if let Ok(mut cursor) = self.shared.cursor.try_lock() {
            cursor.buffer = None;
            if let Some(stream) = cursor.stream.take() {
                drop(stream);
            }
        }

        debug!("transport closed");
    }
}

enum ChunkOutcome {
    Delivered,
    PeerClosed,
    Cancelled,
    Failed(TransportError),
}

enum BlockOutcome {
    Progress,
    PeerClosed,
    Cancelled,
    Failed(TransportError),
}

/// Drives the chunk state machine until the connection ends. Owns the
/// read-path lock for its whole lifetime.
async fn read_loop(shared: Arc<Shared>, mut cursor: OwnedMutexGuard<ReadCursor>) {
    let handle = match shared.lock_lifecycle().handle {
        Some(handle) => handle,
        None => {
            error!("receive loop started without a socket identity");
            return;
        }
    };

    debug!(%handle, "receive loop started");

    loop {
        // prime the cursor for the next chunk: lazily allocate the buffer
        // and read the 8-byte header first
        if cursor.buffer.is_none() {
            cursor.buffer = Some(
                shared
                    .pool
                    .take(shared.receive_buffer_size, "read_next_message"),
            );
        }
        cursor.bytes_received = 0;
        cursor.bytes_to_receive = HEADER_SIZE;
        cursor.incoming_message_size = -1;

        match read_chunk(&shared, &mut cursor, handle).await {
            ChunkOutcome::Delivered => continue,
            ChunkOutcome::PeerClosed => {
                // graceful close: a partially received chunk is discarded
                // and no error callback fires
                cursor.buffer = None;
                debug!(%handle, "peer closed the connection");
                return;
            }
            ChunkOutcome::Cancelled => {
                cursor.buffer = None;
                if let Some(mut stream) = cursor.stream.take() {
                    // the peer may already be gone; log and swallow
                    if let Err(e) = stream.shutdown().await {
                        debug!(%handle, error = %e, "error shutting down socket");
                    }
                }
                debug!(%handle, "receive loop cancelled");
                return;
            }
            ChunkOutcome::Failed(e) => {
                cursor.buffer = None;
                warn!(%handle, error = %e, "read failed");
                shared.current_sink().on_receive_error(handle, e);
                return;
            }
        }
    }
}

/// Reads one chunk: header phase, body phase, then delivery to the sink.
async fn read_chunk(
    shared: &Shared,
    cursor: &mut ReadCursor,
    handle: SocketHandle,
) -> ChunkOutcome {
    loop {
        while cursor.bytes_received < cursor.bytes_to_receive {
            match receive_block(shared, cursor).await {
                BlockOutcome::Progress => {}
                BlockOutcome::PeerClosed => return ChunkOutcome::PeerClosed,
                BlockOutcome::Cancelled => return ChunkOutcome::Cancelled,
                BlockOutcome::Failed(e) => return ChunkOutcome::Failed(e),
            }
        }

        if cursor.incoming_message_size < 0 {
            // header complete: learn the body size before accepting a
            // single body byte
            let header = {
                let Some(buffer) = cursor.buffer.as_ref() else {
                    return ChunkOutcome::Failed(TransportError::Internal(
                        "receive buffer missing after header read".to_string(),
                    ));
                };
                match ChunkHeader::parse(buffer) {
                    Ok(header) => header,
                    Err(e) => return ChunkOutcome::Failed(e),
                }
            };

            if let Err(e) = header.validate_size(shared.receive_buffer_size) {
                warn!(
                    %handle,
                    declared = header.message_size,
                    max = shared.receive_buffer_size,
                    "chunk length out of bounds"
                );
                return ChunkOutcome::Failed(e);
            }

            cursor.incoming_message_size = i64::from(header.message_size);
            cursor.bytes_to_receive = header.message_size as usize;
            continue;
        }

        // body complete: hand the chunk to the sink as a borrowed view,
        // then release the buffer before the next chunk starts
        let size = cursor.incoming_message_size as usize;
        let sink = shared.current_sink();

        let Some(buffer) = cursor.buffer.as_ref() else {
            return ChunkOutcome::Failed(TransportError::Internal(
                "receive buffer missing at delivery".to_string(),
            ));
        };

        let chunk = &buffer[..size];
        if catch_unwind(AssertUnwindSafe(|| sink.on_message_received(handle, chunk))).is_err() {
            error!(%handle, "message sink panicked in on_message_received");
        }

        cursor.buffer = None;
        return ChunkOutcome::Delivered;
    }
}

/// Issues one receive for the bytes still missing from the current phase.
/// The buffer is marked in flight with the pool for the duration of the
/// operation.
async fn receive_block(shared: &Shared, cursor: &mut ReadCursor) -> BlockOutcome {
    let ReadCursor {
        stream,
        buffer,
        bytes_received,
        bytes_to_receive,
        ..
    } = cursor;

    let Some(stream) = stream.as_mut() else {
        return BlockOutcome::Failed(TransportError::ConnectionClosed);
    };
    let Some(buffer) = buffer.as_mut() else {
        return BlockOutcome::Failed(TransportError::Internal(
            "receive issued without a buffer".to_string(),
        ));
    };

    buffer.mark_in_flight();
    let read = tokio::select! {
        _ = shared.cancel.cancelled() => None,
        result = stream.read(&mut buffer[*bytes_received..*bytes_to_receive]) => Some(result),
    };
    buffer.clear_in_flight();

    match read {
        None => BlockOutcome::Cancelled,
        Some(Ok(0)) => BlockOutcome::PeerClosed,
        Some(Ok(n)) => {
            *bytes_received += n;
            BlockOutcome::Progress
        }
        Some(Err(e)) => BlockOutcome::Failed(e.into()),
    }
}
