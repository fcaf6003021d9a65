//! Blocking TCP client transport
//!
//! Connects to a transaction server; each `transact` writes one request
//! frame and blocks the calling thread until the matching reply arrives.
//! The socket is driven by a private current-thread runtime, so the
//! transport may be used from plain threads or `spawn_blocking`, but not
//! from inside an async task.
//!
//! A connection that fails mid-transaction is dropped: later calls report
//! [`TransportError::Closed`] rather than reading stale bytes.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};

use super::codec::{Decoder, Encoder, Frame, FrameKind};
use super::{NetworkConfig, RawReply, Transport, TransportError, TransportResult};
use crate::protocol::{Parcel, StatusCode};

/// Stream plus framing state, used by one transaction at a time
struct ClientConnection {
    stream: TcpStream,
    encoder: Encoder,
    decoder: Decoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl ClientConnection {
    fn new(stream: TcpStream, max_message_size: usize) -> Self {
        Self {
            stream,
            encoder: Encoder::new(max_message_size),
            decoder: Decoder::new(max_message_size),
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
        }
    }

    /// Send `request` and wait for the reply carrying its sequence
    async fn round_trip(&mut self, request: &Frame) -> TransportResult<Frame> {
        self.write_buf.clear();
        self.encoder.encode(request, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;

        let reply = loop {
            if let Some(frame) = self.decoder.decode(&mut self.read_buf)? {
                break frame;
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(TransportError::Closed);
            }
        };

        if reply.kind != FrameKind::Reply || reply.sequence != request.sequence {
            return Err(TransportError::UnexpectedFrame(format!(
                "{:?} #{} while waiting for reply #{}",
                reply.kind, reply.sequence, request.sequence
            )));
        }
        Ok(reply)
    }
}

/// Transport over a single TCP connection
pub struct TcpTransport {
    remote_addr: SocketAddr,
    /// `None` once a transaction has failed on this connection
    connection: Mutex<Option<ClientConnection>>,
    next_sequence: AtomicU32,
    /// Declared after the connection so the socket is dropped first
    runtime: Runtime,
}

impl TcpTransport {
    /// Connect to a server by address
    pub fn connect(addr: SocketAddr, config: &NetworkConfig) -> TransportResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let stream = runtime.block_on(open_stream(addr, config.connect_timeout_ms))?;
        Ok(Self::from_parts(addr, runtime, stream, config))
    }

    /// Connect to a server by hostname
    pub fn connect_hostname(host: &str, config: &NetworkConfig) -> TransportResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (addr, stream) = runtime.block_on(async {
            let addr = tokio::net::lookup_host((host, config.port))
                .await?
                .next()
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Could not resolve host: {}", host),
                    )
                })?;
            let stream = open_stream(addr, config.connect_timeout_ms).await?;
            Ok::<_, TransportError>((addr, stream))
        })?;
        Ok(Self::from_parts(addr, runtime, stream, config))
    }

    fn from_parts(
        remote_addr: SocketAddr,
        runtime: Runtime,
        stream: TcpStream,
        config: &NetworkConfig,
    ) -> Self {
        Self {
            remote_addr,
            runtime,
            connection: Mutex::new(Some(ClientConnection::new(
                stream,
                config.max_message_size,
            ))),
            next_sequence: AtomicU32::new(1),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Whether the connection is still usable
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

async fn open_stream(addr: SocketAddr, timeout_ms: u64) -> TransportResult<TcpStream> {
    tracing::info!("Connecting to {}", addr);

    let stream = tokio::time::timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout)??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl Transport for TcpTransport {
    fn transact(&self, code: u32, data: &Parcel, flags: u32) -> TransportResult<RawReply> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let request = Frame::request(sequence, code, flags, data.to_bytes());

        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(conn) = guard.as_mut() else {
            return Err(TransportError::Closed);
        };

        let reply = match self.runtime.block_on(conn.round_trip(&request)) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    "Transaction {} to {} failed, dropping connection: {}",
                    code,
                    self.remote_addr,
                    e
                );
                *guard = None;
                return Err(e);
            }
        };

        tracing::debug!(
            "Transaction {} answered with status {} ({} bytes)",
            code,
            reply.status,
            reply.payload.len()
        );

        Ok(RawReply {
            status: StatusCode::from_raw(reply.status),
            parcel: Parcel::from_bytes(&reply.payload),
        })
    }
}
