#![allow(dead_code)]
//! Shared helpers for transport integration tests: a channel-backed sink,
//! chunk builders, and a connected client/peer pair over loopback TCP.

use chunk_transport::config::HEADER_SIZE;
use chunk_transport::{
    BufferPool, ChunkHeader, MessageSink, MessageSocket, SocketHandle, TransportConfig,
    TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SinkEvent {
    Message(Vec<u8>),
    Error(TransportError),
}

/// A sink that forwards every callback into an unbounded channel so tests
/// can await deliveries without polling shared state.
pub struct ChannelSink {
    events: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events: tx }), rx)
    }
}

impl MessageSink for ChannelSink {
    fn on_message_received(&self, _source: SocketHandle, chunk: &[u8]) {
        let _ = self.events.send(SinkEvent::Message(chunk.to_vec()));
    }

    fn on_receive_error(&self, _source: SocketHandle, error: TransportError) {
        let _ = self.events.send(SinkEvent::Error(error));
    }
}

pub fn test_config(receive_buffer_size: usize) -> TransportConfig {
    TransportConfig {
        receive_buffer_size,
        connect_timeout: Duration::from_secs(5),
        pool_capacity: 2,
    }
}

/// Build one well-formed chunk: header plus body.
pub fn chunk(message_type: u32, body: &[u8]) -> Vec<u8> {
    let header = ChunkHeader {
        message_type,
        message_size: (HEADER_SIZE + body.len()) as u32,
    };
    let mut bytes = header.to_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes
}

/// Build a raw header declaring an arbitrary total length, for tests that
/// exercise the length bound.
pub fn raw_header(message_type: u32, declared_size: u32) -> Vec<u8> {
    ChunkHeader {
        message_type,
        message_size: declared_size,
    }
    .to_bytes()
    .to_vec()
}

/// Route transport traces into the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Connect a transport to a loopback listener and hand back the peer side.
pub async fn connected_pair(
    config: &TransportConfig,
    pool: &BufferPool,
) -> (MessageSocket, TcpStream, mpsc::UnboundedReceiver<SinkEvent>) {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (sink, events) = ChannelSink::new();
    let socket = MessageSocket::new(sink, pool.clone(), config).unwrap();

    let url = format!("test.tcp://127.0.0.1:{port}");
    let (connected, accepted) = tokio::join!(socket.connect(&url), listener.accept());
    connected.unwrap();
    let (peer, _) = accepted.unwrap();

    (socket, peer, events)
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> SinkEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a sink event")
        .expect("sink channel closed")
}

pub async fn expect_message(events: &mut mpsc::UnboundedReceiver<SinkEvent>) -> Vec<u8> {
    match next_event(events).await {
        SinkEvent::Message(bytes) => bytes,
        SinkEvent::Error(e) => panic!("expected a delivery, got error: {e}"),
    }
}

/// Assert that no callback fires within a settling window.
pub async fn expect_silence(events: &mut mpsc::UnboundedReceiver<SinkEvent>) {
    let outcome = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    if let Ok(Some(event)) = outcome {
        panic!("expected no sink event, got {event:?}");
    }
}

/// Wait until every checked-out buffer has made it back to the pool.
pub async fn wait_balanced(pool: &BufferPool) {
    for _ in 0..250 {
        if pool.taken() == pool.returned() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "buffer pool unbalanced: taken={} returned={}",
        pool.taken(),
        pool.returned()
    );
}
