//! Newline-delimited JSON link to the manager.
//!
//! A connected [`TcpStream`] is framed with [`FrameCodec`] (a [`LinesCodec`]
//! that drops bad lines instead of failing) and split in two:
//!
//! | Half | Role |
//! |------|------|
//! | [`LinkSender`] | queues outbound text on an unbounded channel (never blocks) |
//! | writer task | drains the channel into the socket; ends when every sender is dropped |
//! | [`LinkReader`] | yields [`LinkEvent`]s: a message, a dropped frame or read error, or close |
//!
//! An over-long line or one that is not UTF-8 is reported and skipped; the
//! frames after it are still delivered on the same link.
//!
//! Dialing goes through the [`Dialer`] trait so tests can script connect
//! failures.

use std::io;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::stream::{SplitStream, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::errors::{AgentError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Dialing
// ─────────────────────────────────────────────────────────────────────────────

/// Opens connections to the manager.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `addr` (`host:port`).
    async fn dial(&self, addr: &str) -> Result<TcpStream>;
}

/// Plain TCP dialer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> Result<TcpStream> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| AgentError::Connect {
                addr: addr.to_owned(),
                source,
            })?;
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%error, "failed to set TCP_NODELAY");
        }
        Ok(stream)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────────────────────────

/// One decoded line, or the reason a line was skipped.
#[derive(Debug)]
pub enum Frame {
    /// A complete UTF-8 line without its terminator.
    Line(String),
    /// A line that was discarded (too long or not UTF-8).
    Dropped(LinesCodecError),
}

/// Newline framing that survives bad lines.
///
/// `Framed` stops decoding buffered input after its codec returns an error,
/// so recoverable line errors are yielded as [`Frame::Dropped`] items.
/// Only genuine I/O failures are errors.
#[derive(Debug)]
pub struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    /// Lines longer than `max_length` bytes are dropped.
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn recover(
        decoded: std::result::Result<Option<String>, LinesCodecError>,
    ) -> std::result::Result<Option<Frame>, LinesCodecError> {
        match decoded {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::Io(error)) if error.kind() != io::ErrorKind::InvalidData => {
                Err(LinesCodecError::Io(error))
            }
            Err(error) => Ok(Some(Frame::Dropped(error))),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Frame>, Self::Error> {
        Self::recover(self.lines.decode(buf))
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Frame>, Self::Error> {
        Self::recover(self.lines.decode_eof(buf))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        self.lines.encode(line, dst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Link halves
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound half of a link.
#[derive(Clone, Debug)]
pub struct LinkSender {
    tx: mpsc::UnboundedSender<String>,
}

impl LinkSender {
    /// Queue one frame. Returns `false` if the writer is gone.
    pub fn send(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }
}

/// Something that happened on the inbound half.
#[derive(Debug)]
pub enum LinkEvent {
    /// One complete frame.
    Message(String),
    /// A frame was dropped, or reading failed. Only [`LinkEvent::Closed`]
    /// ends the link.
    Error(AgentError),
    /// The peer closed the connection.
    Closed,
}

/// Inbound half of a link.
pub struct LinkReader {
    frames: SplitStream<Framed<TcpStream, FrameCodec>>,
}

impl LinkReader {
    /// Wait for the next inbound event.
    pub async fn next_event(&mut self) -> LinkEvent {
        match self.frames.next().await {
            Some(Ok(Frame::Line(line))) => LinkEvent::Message(line),
            Some(Ok(Frame::Dropped(error))) => LinkEvent::Error(error.into()),
            Some(Err(error)) => LinkEvent::Error(error.into()),
            None => LinkEvent::Closed,
        }
    }
}

/// Wrap a connected stream. Spawns the writer task.
pub fn open(stream: TcpStream, max_frame_length: usize) -> (LinkSender, LinkReader, JoinHandle<()>) {
    let framed = Framed::new(stream, FrameCodec::new(max_frame_length));
    let (mut sink, frames) = framed.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(error) = sink.send(text).await {
                warn!(%error, "write to manager failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    (LinkSender { tx }, LinkReader { frames }, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let client = TcpDialer.dial(&addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (client, server) = pair().await;
        let (sender, mut reader, _writer) = open(client, 1024);
        let (server_read, mut server_write) = server.into_split();
        let mut server_lines = BufReader::new(server_read).lines();

        assert!(sender.send(r#"{"command":"offer","slots":1}"#.to_string()));
        let line = server_lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"command":"offer","slots":1}"#);

        server_write.write_all(b"{\"command\":\"push\"}\n").await.unwrap();
        assert_matches!(reader.next_event().await, LinkEvent::Message(m) if m == r#"{"command":"push"}"#);

        drop(server_write);
        drop(server_lines);
        assert_matches!(reader.next_event().await, LinkEvent::Closed);
    }

    #[tokio::test]
    async fn oversized_frame_is_an_error() {
        let (client, server) = pair().await;
        let (_sender, mut reader, _writer) = open(client, 8);
        let (_server_read, mut server_write) = server.into_split();

        server_write
            .write_all(b"0123456789abcdef\n{\"a\":1}\n")
            .await
            .unwrap();
        assert_matches!(
            reader.next_event().await,
            LinkEvent::Error(AgentError::Codec(LinesCodecError::MaxLineLengthExceeded))
        );
        assert_matches!(reader.next_event().await, LinkEvent::Message(m) if m == r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn non_utf8_frame_is_skipped() {
        let (client, server) = pair().await;
        let (_sender, mut reader, _writer) = open(client, 1024);
        let (_server_read, mut server_write) = server.into_split();

        server_write.write_all(b"\xff\xfe\nok\n").await.unwrap();
        assert_matches!(reader.next_event().await, LinkEvent::Error(AgentError::Codec(_)));
        assert_matches!(reader.next_event().await, LinkEvent::Message(m) if m == "ok");

        drop(server_write);
        assert_matches!(reader.next_event().await, LinkEvent::Closed);
    }

    #[test]
    fn codec_splits_lines_and_drops_long_ones() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::from(&b"abc\ntoolong\nxy\n"[..]);
        assert_matches!(codec.decode(&mut buf), Ok(Some(Frame::Line(l))) if l == "abc");
        assert_matches!(codec.decode(&mut buf), Ok(Some(Frame::Dropped(_))));
        assert_matches!(codec.decode(&mut buf), Ok(Some(Frame::Line(l))) if l == "xy");
        assert_matches!(codec.decode(&mut buf), Ok(None));
    }

    #[tokio::test]
    async fn writer_stops_when_sender_dropped() {
        let (client, _server) = pair().await;
        let (sender, _reader, writer) = open(client, 1024);
        drop(sender);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn refused_dial_is_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = TcpDialer.dial(&addr).await.unwrap_err();
        assert!(err.is_connection_refused(), "{err}");
    }
}
