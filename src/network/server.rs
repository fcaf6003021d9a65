//! Transaction server
//!
//! Accepts TCP connections and feeds each request frame to the dispatcher.
//! Dispatch runs on the blocking pool; connections are served concurrently,
//! transactions on one connection one at a time.

use bytes::Bytes;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

use super::connection::{Connection, ConnectionError};
use super::NetworkConfig;
use crate::protocol::{Parcel, StatusCode};
use crate::service::Dispatcher;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Events emitted by the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Started { bind_addr: SocketAddr },
    ClientConnected { addr: SocketAddr },
    ClientDisconnected { addr: SocketAddr, reason: String },
    /// A transaction was answered with `status`
    TransactionHandled {
        addr: SocketAddr,
        code: u32,
        status: StatusCode,
    },
    Stopped,
}

/// State every connection task shares
struct Shared {
    dispatcher: Arc<Dispatcher>,
    clients: RwLock<HashSet<SocketAddr>>,
    events: mpsc::Sender<ServerEvent>,
    max_message_size: usize,
}

impl Shared {
    /// Events are advisory; a full or dropped receiver never stalls a client
    fn emit(&self, event: ServerEvent) {
        let _ = self.events.try_send(event);
    }
}

/// Transaction server
pub struct Server {
    config: NetworkConfig,
    shared: Arc<Shared>,
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: NetworkConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let (events, event_rx) = mpsc::channel(256);

        Self {
            shared: Arc::new(Shared {
                dispatcher,
                clients: RwLock::new(HashSet::new()),
                events,
                max_message_size: config.max_message_size,
            }),
            config,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Bind and start accepting; returns the bound address
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.running.store(true, Ordering::SeqCst);
        self.shared.emit(ServerEvent::Started {
            bind_addr: local_addr,
        });

        tokio::spawn(accept_loop(
            listener,
            self.shared.clone(),
            self.running.clone(),
            shutdown_rx,
        ));

        Ok(local_addr)
    }

    /// Stop accepting connections; open connections finish on their own
    pub async fn stop(&mut self) -> ServerResult<()> {
        let tx = self.shutdown_tx.take().ok_or(ServerError::NotRunning)?;
        let _ = tx.send(()).await;
        Ok(())
    }

    /// Addresses of connected clients
    pub async fn clients(&self) -> Vec<SocketAddr> {
        self.shared.clients.read().await.iter().copied().collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    tracing::info!("New connection from {}", addr);
                    tokio::spawn(serve_client(stream, addr, shared.clone()));
                }
                Err(e) => tracing::error!("Accept error: {}", e),
            },
            _ = shutdown_rx.recv() => {
                tracing::info!("Server shutdown requested");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    shared.emit(ServerEvent::Stopped);
}

/// Run one request through the dispatcher on the blocking pool
async fn dispatch(dispatcher: Arc<Dispatcher>, code: u32, payload: Bytes) -> (StatusCode, Bytes) {
    let result = tokio::task::spawn_blocking(move || {
        let mut data = Parcel::from_bytes(&payload);
        let mut reply = Parcel::new();
        let outcome = dispatcher.on_transact(code, &mut data, &mut reply);
        (outcome.status(), reply.to_bytes())
    })
    .await;

    match result {
        Ok(answer) => answer,
        Err(e) => {
            tracing::error!("Dispatch of transaction {} aborted: {}", code, e);
            (StatusCode::UnknownError, Bytes::new())
        }
    }
}

async fn serve_client(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let mut conn = Connection::new(stream, addr, shared.max_message_size);
    shared.clients.write().await.insert(addr);
    shared.emit(ServerEvent::ClientConnected { addr });

    let reason = match transaction_loop(&mut conn, &shared).await {
        Ok(()) => "Connection closed".to_string(),
        Err(e) => {
            tracing::warn!("Client {} dropped: {}", addr, e);
            e.to_string()
        }
    };

    shared.clients.write().await.remove(&addr);

    let stats = conn.stats();
    tracing::debug!(
        "Connection {} done after {:?}: {} requests, {} failed, {}B in, {}B out",
        addr,
        conn.uptime(),
        stats.requests,
        stats.failed,
        stats.bytes_in,
        stats.bytes_out
    );
    let _ = conn.close().await;

    shared.emit(ServerEvent::ClientDisconnected { addr, reason });
}

async fn transaction_loop(conn: &mut Connection, shared: &Shared) -> Result<(), ConnectionError> {
    while let Some(request) = conn.next_request().await? {
        let (status, payload) =
            dispatch(shared.dispatcher.clone(), request.code, request.payload.clone()).await;
        conn.reply(&request, status, payload).await?;

        shared.emit(ServerEvent::TransactionHandled {
            addr: conn.remote_addr(),
            code: request.code,
            status,
        });
    }
    Ok(())
}
