//! Server side of one client connection
//!
//! Reads request frames off the socket and writes the matching replies.
//! A connection carries one transaction at a time: the next request is not
//! read until the previous reply has gone out.

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::codec::{CodecError, Decoder, Encoder, Frame, FrameKind};
use crate::protocol::StatusCode;

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Peer sent a reply frame (#{0}) to the server")]
    UnexpectedReply(u32),

    #[error("Connection closed mid-frame")]
    Truncated,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Per-connection transaction counters
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    pub requests: u64,
    pub replies: u64,
    /// Replies whose status was not OK
    pub failed: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// A client connection on the server side
pub struct Connection {
    remote_addr: SocketAddr,
    stream: TcpStream,
    encoder: Encoder,
    decoder: Decoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
    /// Sequence of the request awaiting its reply
    pending: Option<u32>,
    opened_at: Instant,
    stats: ConnectionStats,
}

impl Connection {
    pub fn new(stream: TcpStream, remote_addr: SocketAddr, max_message_size: usize) -> Self {
        Self {
            remote_addr,
            stream,
            encoder: Encoder::new(max_message_size),
            decoder: Decoder::new(max_message_size),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            pending: None,
            opened_at: Instant::now(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// How long the connection has been open
    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Next request frame, or `None` once the peer has closed cleanly
    pub async fn next_request(&mut self) -> ConnectionResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.read_buf)? {
                if frame.kind != FrameKind::Request {
                    return Err(ConnectionError::UnexpectedReply(frame.sequence));
                }
                self.stats.requests += 1;
                self.pending = Some(frame.sequence);
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return if self.read_buf.is_empty() && self.decoder.is_idle() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Truncated)
                };
            }
            self.stats.bytes_in += n as u64;
        }
    }

    /// Answer `request` with `status` and `payload`
    pub async fn reply(
        &mut self,
        request: &Frame,
        status: StatusCode,
        payload: Bytes,
    ) -> ConnectionResult<()> {
        if self.pending != Some(request.sequence) {
            tracing::warn!(
                "{}: replying to #{} while #{:?} is pending",
                self.remote_addr,
                request.sequence,
                self.pending
            );
        }

        let frame = Frame::reply_to(request, status.to_raw(), payload);
        self.write_buf.clear();
        self.encoder.encode(&frame, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        self.pending = None;
        self.stats.replies += 1;
        self.stats.bytes_out += self.write_buf.len() as u64;
        if !status.is_ok() {
            self.stats.failed += 1;
        }
        Ok(())
    }

    /// Shut down the write half
    pub async fn close(&mut self) -> ConnectionResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
