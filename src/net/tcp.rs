//! [`Stream`] over a tokio TCP socket.
//!
//! # Data Flow
//! ```text
//! socket read half ─▶ reader task ─▶ bounded chunk channel ─▶ read_next()
//!                          └─▶ Readable / Closed events
//! write() ─▶ unbounded chunk queue ─▶ writer task ─▶ socket write half
//!                                          └─▶ Writable / Closed events
//! ```
//!
//! # Design Decisions
//! - The bounded inbound channel is the read-side backpressure: a session
//!   that cannot forward stops draining it and the reader stops reading
//! - The outbound queue is unbounded but `is_writable` goes false above
//!   [`WRITE_HIGH_WATER`] queued bytes
//! - Dropping the handle closes the outbound queue; the writer task drains
//!   it, shuts the write half down and exits on its own

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::net::connection::ConnectionId;
use crate::net::listener::ConnectionPermit;
use crate::net::stream::{Stream, StreamEventKind};
use crate::runtime::event::EventSender;

/// Size of a single read.
const READ_CHUNK: usize = 16 * 1024;

/// Chunks buffered ahead of the session before the reader pauses.
const INBOUND_CHUNKS: usize = 8;

/// Queued outbound bytes above which the stream reports not writable.
pub const WRITE_HIGH_WATER: usize = 256 * 1024;

#[derive(Debug)]
struct Shared {
    connected: AtomicBool,
    queued: AtomicUsize,
}

/// A connected TCP socket driven by a reader and a writer task.
#[derive(Debug)]
pub struct TcpStream {
    id: ConnectionId,
    remote: SocketAddr,
    shared: Arc<Shared>,
    inbound: mpsc::Receiver<Bytes>,
    peeked: Option<Bytes>,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    reader: AbortHandle,
    writer: AbortHandle,
    _permit: Option<ConnectionPermit>,
}

impl TcpStream {
    /// Take over a connected socket and start its I/O tasks.
    pub fn spawn(socket: tokio::net::TcpStream, remote: SocketAddr, events: EventSender) -> Self {
        let id = ConnectionId::new();
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }
        let (read_half, write_half) = socket.into_split();
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(true),
            queued: AtomicUsize::new(0),
        });
        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CHUNKS);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            id,
            read_half,
            inbound_tx,
            Arc::clone(&shared),
            events.clone(),
        ))
        .abort_handle();
        let writer = tokio::spawn(write_loop(
            id,
            write_half,
            outbound_rx,
            Arc::clone(&shared),
            events,
        ))
        .abort_handle();

        tracing::trace!(connection_id = %id, remote = %remote, "Stream started");

        Self {
            id,
            remote,
            shared,
            inbound,
            peeked: None,
            outbound: Some(outbound),
            reader,
            writer,
            _permit: None,
        }
    }

    /// Hold a listener slot for as long as this stream lives.
    pub fn with_permit(mut self, permit: ConnectionPermit) -> Self {
        self._permit = Some(permit);
        self
    }

    fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }
}

impl Stream for TcpStream {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }

    fn write(&mut self, chunk: Bytes) {
        let Some(outbound) = &self.outbound else {
            return;
        };
        let len = chunk.len();
        self.shared.queued.fetch_add(len, Ordering::AcqRel);
        if outbound.send(chunk).is_err() {
            self.shared.queued.fetch_sub(len, Ordering::AcqRel);
        }
    }

    fn read_next(&mut self) -> Option<Bytes> {
        self.peeked.take().or_else(|| self.inbound.try_recv().ok())
    }

    fn next_size(&mut self) -> usize {
        if self.peeked.is_none() {
            self.peeked = self.inbound.try_recv().ok();
        }
        self.peeked.as_ref().map_or(0, Bytes::len)
    }

    fn is_writable(&self) -> bool {
        self.outbound.is_some() && self.is_connected() && self.queued() < WRITE_HIGH_WATER
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn has_unsent_data(&self) -> bool {
        self.queued() > 0
    }

    fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
        self.shared.connected.store(false, Ordering::Release);
    }

    fn abort(&mut self) {
        self.close();
        self.reader.abort();
        self.writer.abort();
        self.shared.queued.store(0, Ordering::Release);
        tracing::trace!(connection_id = %self.id, "Stream aborted");
    }
}

async fn read_loop(
    id: ConnectionId,
    mut half: OwnedReadHalf,
    inbound: mpsc::Sender<Bytes>,
    shared: Arc<Shared>,
    events: EventSender,
) {
    loop {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let read = tokio::select! {
            read = half.read_buf(&mut buf) => read,
            // Owner closed or dropped the stream.
            _ = inbound.closed() => return,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                if inbound.send(buf.freeze()).await.is_err() {
                    return;
                }
                events.stream(id, StreamEventKind::Readable);
            }
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                break;
            }
        }
    }
    shared.connected.store(false, Ordering::Release);
    events.stream(id, StreamEventKind::Closed);
}

async fn write_loop(
    id: ConnectionId,
    mut half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
    events: EventSender,
) {
    while let Some(chunk) = outbound.recv().await {
        let len = chunk.len();
        if let Err(e) = half.write_all(&chunk).await {
            tracing::debug!(connection_id = %id, error = %e, "Write failed");
            shared.queued.store(0, Ordering::Release);
            shared.connected.store(false, Ordering::Release);
            events.stream(id, StreamEventKind::Closed);
            return;
        }
        let before = shared.queued.fetch_sub(len, Ordering::AcqRel);
        if before >= WRITE_HIGH_WATER && before - len < WRITE_HIGH_WATER {
            events.stream(id, StreamEventKind::Writable);
        }
    }
    let _ = half.shutdown().await;
    tracing::trace!(connection_id = %id, "Write half closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::event::{self, Event};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, tokio::net::TcpStream, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (socket, remote) = listener.accept().await.unwrap();
        let (tx, rx) = event::channel();
        (TcpStream::spawn(socket, remote, tx), peer, rx)
    }

    async fn next_stream_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Event>) -> StreamEventKind {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Event::Stream(event))) => event.kind,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reads_are_buffered_until_taken() {
        let (mut stream, mut peer, mut rx) = pair().await;
        peer.write_all(b"ping").await.unwrap();

        assert_eq!(next_stream_event(&mut rx).await, StreamEventKind::Readable);
        assert_eq!(stream.next_size(), 4);
        assert_eq!(stream.read_next().unwrap(), Bytes::from_static(b"ping"));
        assert_eq!(stream.next_size(), 0);
    }

    #[tokio::test]
    async fn writes_reach_the_peer() {
        let (mut stream, mut peer, _rx) = pair().await;
        assert!(stream.is_writable());
        stream.write(Bytes::from_static(b"pong"));

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn peer_close_is_reported() {
        let (stream, peer, mut rx) = pair().await;
        drop(peer);

        assert_eq!(next_stream_event(&mut rx).await, StreamEventKind::Closed);
        assert!(!stream.is_connected());
    }

    #[tokio::test]
    async fn dropped_stream_flushes_then_closes() {
        let (mut stream, mut peer, _rx) = pair().await;
        stream.write(Bytes::from_static(b"last words"));
        drop(stream);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"last words");
    }

    #[tokio::test]
    async fn backlog_above_high_water_blocks_until_drained() {
        let (mut stream, mut peer, mut rx) = pair().await;
        let chunk = Bytes::from(vec![7u8; READ_CHUNK]);
        let chunks = WRITE_HIGH_WATER / READ_CHUNK * 2;
        for _ in 0..chunks {
            stream.write(chunk.clone());
        }
        assert!(!stream.is_writable());
        assert!(stream.has_unsent_data());

        let mut received = vec![0u8; chunks * READ_CHUNK];
        peer.read_exact(&mut received).await.unwrap();
        assert!(received.iter().all(|&b| b == 7));

        assert_eq!(next_stream_event(&mut rx).await, StreamEventKind::Writable);
        assert!(stream.is_writable());
    }
}
