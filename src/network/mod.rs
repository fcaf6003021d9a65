//! Network module - Delivers transactions between caller and service
//!
//! Provides:
//! - the transport seam the proxy talks through
//! - an in-process transport straight into a dispatcher
//! - a TCP server and a blocking TCP client transport

mod client;
mod codec;
mod connection;
mod server;

pub use client::*;
pub use codec::*;
pub use connection::*;
pub use server::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::protocol::{Parcel, StatusCode, DEFAULT_PORT};
use crate::service::Dispatcher;

/// Transaction flag: caller does not wait for a reply. Carried on the wire
/// but every call in this crate still waits.
pub const FLAG_ONEWAY: u32 = 0x01;

/// Channel failures; passed to callers unchanged
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection closed")]
    Closed,

    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error("Connection timeout")]
    Timeout,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// What came back from the callee: transaction status plus reply message
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: StatusCode,
    pub parcel: Parcel,
}

/// Black-box request/reply channel
///
/// `transact` blocks until the reply arrives or the channel fails.
pub trait Transport: Send + Sync {
    fn transact(&self, code: u32, data: &Parcel, flags: u32) -> TransportResult<RawReply>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn transact(&self, code: u32, data: &Parcel, flags: u32) -> TransportResult<RawReply> {
        (**self).transact(code, data, flags)
    }
}

/// Delivers transactions to a dispatcher in the same process
///
/// Messages are copied through their byte form so nothing is shared
/// between the two sides but the buffer contents.
pub struct LocalTransport {
    dispatcher: Arc<Dispatcher>,
    transactions: AtomicU64,
}

impl LocalTransport {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            transactions: AtomicU64::new(0),
        }
    }

    /// Number of transactions delivered so far
    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::SeqCst)
    }
}

impl Transport for LocalTransport {
    fn transact(&self, code: u32, data: &Parcel, _flags: u32) -> TransportResult<RawReply> {
        self.transactions.fetch_add(1, Ordering::SeqCst);

        let mut request = Parcel::from_bytes(data.as_bytes());
        let mut reply = Parcel::new();
        let outcome = self.dispatcher.on_transact(code, &mut request, &mut reply);

        Ok(RawReply {
            status: outcome.status(),
            parcel: Parcel::from_bytes(reply.as_bytes()),
        })
    }
}

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Port to listen on or connect to
    pub port: u16,
    /// Interface to bind to (server)
    pub bind_address: String,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Maximum payload size per frame
    pub max_message_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            connect_timeout_ms: 5000,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl NetworkConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}
