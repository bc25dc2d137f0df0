//! Byte transport between the client and the host
//!
//! The client only needs three things from a transport: queue a frame, close,
//! and say whether it is still usable. That is [`MessageTransport`]. Reading
//! is separate: the TCP adapter hands back a [`TcpReceiver`] that the client's
//! reactor polls with a timeout.
//!
//! # TCP adapter
//!
//! `send` never blocks. Frames go through an unbounded channel to a writer
//! task that owns the write half of the socket and applies the send timeout
//! to every frame. A failed or slow write ends the writer task, after which
//! [`MessageTransport::is_connected`] reports `false`; nothing is retried.
//! Closing drops the channel: the writer flushes what is queued and shuts
//! the socket down.

use bellite_core::{Error, Result};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Size of a single socket read
const READ_CHUNK: usize = 4096;

/// Sending side of a connection
pub trait MessageTransport {
    /// Queue an encoded frame (delimiter included)
    fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Stop accepting frames and release the connection
    fn close(&self);

    fn is_connected(&self) -> bool;
}

/// Timeouts applied by the TCP adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// Limit for establishing the TCP connection
    pub connect: Duration,
    /// Limit for writing one frame
    pub send: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(500),
            send: Duration::from_millis(10),
        }
    }
}

/// What one poll of the receiver produced
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Bytes read from the socket
    Data(Vec<u8>),
    /// Nothing arrived before the timeout
    Idle,
    /// The peer closed the connection
    Closed,
    /// The read failed
    Failed(Error),
}

/// Write side of a TCP connection to the host
pub struct TcpTransport {
    outbound: RefCell<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connect to `host:port` and split the stream
    ///
    /// Must be called inside a tokio runtime; the writer task is spawned on
    /// it.
    #[tracing::instrument(skip(timeouts))]
    pub async fn connect(
        host: &str,
        port: u16,
        timeouts: TransportTimeouts,
    ) -> Result<(Self, TcpReceiver)> {
        let stream = timeout(timeouts.connect, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::Timeout)??;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        let (reader, writer) = stream.into_split();
        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, queue, timeouts.send));

        tracing::debug!(peer = %peer, "TCP connection established");

        Ok((
            Self {
                outbound: RefCell::new(Some(outbound)),
                peer,
            },
            TcpReceiver { reader },
        ))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl MessageTransport for TcpTransport {
    fn send(&self, frame: Vec<u8>) -> Result<()> {
        match self.outbound.borrow().as_ref() {
            Some(outbound) => outbound.send(frame).map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    fn close(&self) {
        if self.outbound.borrow_mut().take().is_some() {
            tracing::debug!(peer = %self.peer, "Closing transport");
        }
    }

    fn is_connected(&self) -> bool {
        self.outbound
            .borrow()
            .as_ref()
            .is_some_and(|outbound| !outbound.is_closed())
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    send_timeout: Duration,
) {
    while let Some(frame) = queue.recv().await {
        match timeout(send_timeout, writer.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "Write failed, dropping connection");
                return;
            }
            Err(_) => {
                tracing::warn!(timeout = ?send_timeout, "Write timed out, dropping connection");
                return;
            }
        }
    }

    if let Err(error) = writer.shutdown().await {
        tracing::debug!(error = %error, "Socket shutdown failed");
    }
}

/// Read side of a TCP connection to the host
pub struct TcpReceiver {
    reader: OwnedReadHalf,
}

impl TcpReceiver {
    /// Wait up to `wait` for the next chunk of bytes
    pub async fn recv(&mut self, wait: Duration) -> Inbound {
        let mut chunk = vec![0u8; READ_CHUNK];
        match timeout(wait, self.reader.read(&mut chunk)).await {
            Err(_) => Inbound::Idle,
            Ok(Ok(0)) => Inbound::Closed,
            Ok(Ok(n)) => {
                chunk.truncate(n);
                Inbound::Data(chunk)
            }
            Ok(Err(error)) => Inbound::Failed(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_default_timeouts() {
        let timeouts = TransportTimeouts::default();
        assert_eq!(timeouts.connect, Duration::from_millis(500));
        assert_eq!(timeouts.send, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_frames_reach_peer_and_close_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (transport, _receiver) =
            TcpTransport::connect("127.0.0.1", port, TransportTimeouts::default())
                .await
                .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        assert!(transport.is_connected());
        transport.send(b"{\"a\":1}\0".to_vec()).unwrap();
        transport.close();
        assert!(!transport.is_connected());
        assert_eq!(transport.send(b"late\0".to_vec()), Err(Error::NotConnected));

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"{\"a\":1}\0");
    }

    #[tokio::test]
    async fn test_receiver_reports_data_idle_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (_transport, mut receiver) =
            TcpTransport::connect("127.0.0.1", port, TransportTimeouts::default())
                .await
                .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        assert_eq!(receiver.recv(Duration::from_millis(20)).await, Inbound::Idle);

        peer.write_all(b"{}\0").await.unwrap();
        assert_eq!(
            receiver.recv(Duration::from_secs(1)).await,
            Inbound::Data(b"{}\0".to_vec())
        );

        drop(peer);
        assert_eq!(receiver.recv(Duration::from_secs(1)).await, Inbound::Closed);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport::connect("127.0.0.1", port, TransportTimeouts::default()).await;
        assert!(result.is_err());
    }
}
