//! The framed transport every process speaks.
//!
//! A frame is a big-endian unsigned 32-bit length followed by exactly that
//! many payload bytes. Control frames carry UTF-8 JSON; data frames carry
//! raw block bytes. A connection exchanges one or more frames in sequence,
//! and the first frame's decoded content determines what follows.

use std::io;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::WireError;
use crate::message::NodeAddr;

/// Owns one connection and frames everything crossing it. Every socket
/// operation is bounded by the idle timeout; a connection that stalls past
/// it fails rather than hanging its task.
pub struct Framed<S> {
    stream: S,
    idle_timeout: Duration,
}

impl Framed<TcpStream> {
    /// Dials `addr` and wraps the connection.
    pub async fn connect(addr: &NodeAddr, idle_timeout: Duration) -> Result<Self, WireError> {
        let stream = timeout(idle_timeout, TcpStream::connect((addr.0.as_str(), addr.1)))
            .await
            .map_err(|_| WireError::IdleTimeout)??;
        Ok(Self::new(stream, idle_timeout))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Framed<S> {
    pub fn new(stream: S, idle_timeout: Duration) -> Self {
        Self {
            stream,
            idle_timeout,
        }
    }

    /// Writes one length-prefixed frame.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<(), WireError> {
        let len = u32::try_from(payload.len()).map_err(|_| WireError::FrameTooLarge(payload.len()))?;
        timeout(self.idle_timeout, async {
            self.stream.write_all(&len.to_be_bytes()).await?;
            self.stream.write_all(payload).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| WireError::IdleTimeout)??;
        Ok(())
    }

    /// Reads one length-prefixed frame. EOF before the declared length is a
    /// [`WireError::Truncated`], not a hang.
    pub async fn recv_frame(&mut self) -> Result<Vec<u8>, WireError> {
        let mut len_bytes = [0u8; 4];
        self.read_exact(&mut len_bytes).await?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload).await?;
        Ok(payload)
    }

    /// Serializes `message` and sends it as a control frame.
    pub async fn send_json<T: Serialize>(&mut self, message: &T) -> Result<(), WireError> {
        let payload = serde_json::to_vec(message)?;
        self.send_frame(&payload).await
    }

    /// Receives one control frame and deserializes it.
    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> Result<T, WireError> {
        let payload = self.recv_frame().await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        match timeout(self.idle_timeout, self.stream.read_exact(buf)).await {
            Err(_) => Err(WireError::IdleTimeout),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(WireError::Truncated),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{HeartbeatMessage, NameRequest};

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn frames_round_trip() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut tx = Framed::new(a, TEST_TIMEOUT);
        let mut rx = Framed::new(b, TEST_TIMEOUT);

        tx.send_frame(b"hello").await.expect("send failed");
        assert_eq!(rx.recv_frame().await.expect("recv failed"), b"hello");
    }

    #[tokio::test]
    async fn empty_frames_are_valid() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut tx = Framed::new(a, TEST_TIMEOUT);
        let mut rx = Framed::new(b, TEST_TIMEOUT);

        tx.send_frame(b"").await.expect("send failed");
        assert!(rx.recv_frame().await.expect("recv failed").is_empty());
    }

    #[tokio::test]
    async fn control_and_data_frames_interleave_in_order() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut tx = Framed::new(a, TEST_TIMEOUT);
        let mut rx = Framed::new(b, TEST_TIMEOUT);

        let header = NameRequest::Heartbeat(HeartbeatMessage {
            datanode_id: "node-1".to_string(),
            block_report: vec![],
        });
        tx.send_json(&header).await.expect("send header failed");
        tx.send_frame(b"raw block bytes").await.expect("send bytes failed");

        let received: NameRequest = rx.recv_json().await.expect("recv header failed");
        match received {
            NameRequest::Heartbeat(message) => assert_eq!(message.datanode_id, "node-1"),
            other => panic!("received wrong variant: {other:?}"),
        }
        assert_eq!(
            rx.recv_frame().await.expect("recv bytes failed"),
            b"raw block bytes"
        );
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let (mut a, b) = tokio::io::duplex(64 * 1024);
        let mut rx = Framed::new(b, TEST_TIMEOUT);

        // Declare ten bytes, deliver three, hang up.
        a.write_all(&10u32.to_be_bytes()).await.expect("write failed");
        a.write_all(b"abc").await.expect("write failed");
        drop(a);

        assert!(matches!(rx.recv_frame().await, Err(WireError::Truncated)));
    }

    #[tokio::test]
    async fn truncated_length_prefix_is_an_error() {
        let (mut a, b) = tokio::io::duplex(64 * 1024);
        let mut rx = Framed::new(b, TEST_TIMEOUT);

        a.write_all(&[0, 0]).await.expect("write failed");
        drop(a);

        assert!(matches!(rx.recv_frame().await, Err(WireError::Truncated)));
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let (_a, b) = tokio::io::duplex(64 * 1024);
        let mut rx = Framed::new(b, Duration::from_millis(50));

        // The peer stays connected but never writes.
        assert!(matches!(rx.recv_frame().await, Err(WireError::IdleTimeout)));
    }

    #[tokio::test]
    async fn garbage_control_frame_is_an_error() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut tx = Framed::new(a, TEST_TIMEOUT);
        let mut rx = Framed::new(b, TEST_TIMEOUT);

        tx.send_frame(b"not json").await.expect("send failed");
        assert!(matches!(
            rx.recv_json::<NameRequest>().await,
            Err(WireError::Json(_))
        ));
    }
}
