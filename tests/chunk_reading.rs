#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Chunk read state machine over real loopback TCP: partial reads, header
//! validation, graceful peer close, buffer accounting, and delivery order.

mod common;

use chunk_transport::config::HEADER_SIZE;
use chunk_transport::{BufferPool, MessageSink, MessageSocket, SocketHandle, TransportError};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

#[tokio::test(flavor = "multi_thread")]
async fn delivers_chunk_split_across_partial_writes() {
    let config = test_config(4096);
    let pool = BufferPool::new(4096, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    // type 1, total length 32: the 8-byte header plus 24 bytes of 0xAA,
    // delivered in two network writes of 20 and 12 bytes
    let mut bytes = raw_header(1, 32);
    bytes.extend_from_slice(&[0xAA; 24]);

    peer.write_all(&bytes[..20]).await.unwrap();
    peer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.write_all(&bytes[20..]).await.unwrap();

    let delivered = expect_message(&mut events).await;
    assert_eq!(delivered.len(), 32);
    assert_eq!(&delivered[..HEADER_SIZE], &bytes[..HEADER_SIZE]);
    assert!(delivered[HEADER_SIZE..].iter().all(|&b| b == 0xAA));

    // the reader immediately awaits the next header
    peer.write_all(&chunk(2, b"next")).await.unwrap();
    let next = expect_message(&mut events).await;
    assert_eq!(next.len(), HEADER_SIZE + 4);
    assert_eq!(&next[HEADER_SIZE..], b"next");

    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn delivers_chunks_in_order_and_balances_the_pool() {
    let config = test_config(1024);
    let pool = BufferPool::new(1024, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    let count = 50usize;
    let mut stream_bytes = Vec::new();
    for i in 0..count {
        stream_bytes.extend_from_slice(&chunk(i as u32, &vec![i as u8; i]));
    }
    peer.write_all(&stream_bytes).await.unwrap();

    for i in 0..count {
        let delivered = expect_message(&mut events).await;
        assert_eq!(delivered.len(), HEADER_SIZE + i);
        assert_eq!(&delivered[..4], &(i as u32).to_le_bytes());
        assert!(delivered[HEADER_SIZE..].iter().all(|&b| b == i as u8));
    }

    drop(peer);
    wait_balanced(&pool).await;
    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn header_only_chunk_is_a_complete_delivery() {
    let config = test_config(256);
    let pool = BufferPool::new(256, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    peer.write_all(&chunk(7, b"")).await.unwrap();

    let delivered = expect_message(&mut events).await;
    assert_eq!(delivered.len(), HEADER_SIZE);

    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_declared_length_is_a_protocol_fault() {
    let config = test_config(4096);
    let pool = BufferPool::new(4096, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    peer.write_all(&raw_header(1, 4097)).await.unwrap();

    match next_event(&mut events).await {
        SinkEvent::Error(TransportError::MessageTooLarge { size, max }) => {
            assert_eq!(size, 4097);
            assert_eq!(max, 4096);
        }
        other => panic!("expected a size fault, got {other:?}"),
    }

    // the loop stopped: nothing else is delivered even if the peer keeps
    // writing
    peer.write_all(&chunk(1, b"ignored")).await.ok();
    expect_silence(&mut events).await;
    wait_balanced(&pool).await;
    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn undersized_declared_length_is_a_protocol_fault() {
    let config = test_config(4096);
    let pool = BufferPool::new(4096, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    // a declared total of 4 cannot even cover the length field
    peer.write_all(&raw_header(1, 4)).await.unwrap();

    match next_event(&mut events).await {
        SinkEvent::Error(TransportError::MessageTooLarge { size, .. }) => assert_eq!(size, 4),
        other => panic!("expected a size fault, got {other:?}"),
    }

    wait_balanced(&pool).await;
    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_close_mid_header_is_silent() {
    let config = test_config(1024);
    let pool = BufferPool::new(1024, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    peer.write_all(&[0x01, 0x00, 0x00, 0x00, 0x20]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(peer);

    // the partially received chunk is discarded with no callback
    expect_silence(&mut events).await;
    wait_balanced(&pool).await;
    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_close_mid_body_is_silent() {
    let config = test_config(1024);
    let pool = BufferPool::new(1024, 2);
    let (socket, mut peer, mut events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    let mut bytes = raw_header(1, 100);
    bytes.extend_from_slice(&[0xBB; 10]);
    peer.write_all(&bytes).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(peer);

    expect_silence(&mut events).await;
    wait_balanced(&pool).await;
    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_swap_mid_stream_takes_effect_for_the_next_delivery() {
    let config = test_config(1024);
    let pool = BufferPool::new(1024, 2);
    let (socket, mut peer, mut first_events) = connected_pair(&config, &pool).await;
    socket.start_receiving().unwrap();

    peer.write_all(&chunk(1, b"before")).await.unwrap();
    let delivered = expect_message(&mut first_events).await;
    assert_eq!(&delivered[HEADER_SIZE..], b"before");

    let (second_sink, mut second_events) = ChannelSink::new();
    socket.change_sink(second_sink);

    peer.write_all(&chunk(2, b"after")).await.unwrap();
    let delivered = expect_message(&mut second_events).await;
    assert_eq!(&delivered[HEADER_SIZE..], b"after");
    expect_silence(&mut first_events).await;

    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_sink_does_not_stop_the_loop_or_leak_buffers() {
    struct FlakySink {
        deliveries: AtomicUsize,
        forwarded: Arc<dyn MessageSink>,
    }

    impl MessageSink for FlakySink {
        fn on_message_received(&self, source: SocketHandle, chunk: &[u8]) {
            if self.deliveries.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("sink rejected the first chunk");
            }
            self.forwarded.on_message_received(source, chunk);
        }

        fn on_receive_error(&self, source: SocketHandle, error: TransportError) {
            self.forwarded.on_receive_error(source, error);
        }
    }

    let config = test_config(1024);
    let pool = BufferPool::new(1024, 2);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (inner, mut events) = ChannelSink::new();
    let sink = Arc::new(FlakySink {
        deliveries: AtomicUsize::new(0),
        forwarded: inner,
    });
    let socket = MessageSocket::new(sink, pool.clone(), &config).unwrap();

    let url = format!("test.tcp://127.0.0.1:{port}");
    let (connected, accepted) = tokio::join!(socket.connect(&url), listener.accept());
    connected.unwrap();
    let (mut peer, _) = accepted.unwrap();

    socket.start_receiving().unwrap();

    peer.write_all(&chunk(1, b"boom")).await.unwrap();
    peer.write_all(&chunk(2, b"fine")).await.unwrap();

    // the first delivery panicked inside the sink; the second still arrives
    let delivered = expect_message(&mut events).await;
    assert_eq!(&delivered[HEADER_SIZE..], b"fine");

    drop(peer);
    wait_balanced(&pool).await;
    socket.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn from_stream_attaches_to_an_accepted_connection() {
    let config = test_config(1024);
    let pool = BufferPool::new(1024, 2);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (client, accepted) = tokio::join!(tokio::net::TcpStream::connect(addr), listener.accept());
    let mut client = client.unwrap();
    let (accepted, _) = accepted.unwrap();

    let (sink, mut events) = ChannelSink::new();
    let socket = MessageSocket::from_stream(sink, accepted, pool.clone(), &config).unwrap();
    assert_eq!(socket.state(), chunk_transport::ConnectionState::Connected);
    assert!(socket.handle().is_some());

    socket.start_receiving().unwrap();

    client.write_all(&chunk(9, b"serverbound")).await.unwrap();
    let delivered = expect_message(&mut events).await;
    assert_eq!(&delivered[HEADER_SIZE..], b"serverbound");

    socket.close();
    wait_balanced(&pool).await;
}
