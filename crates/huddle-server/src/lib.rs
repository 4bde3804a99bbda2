//! Huddle chat server.
//!
//! Multi-user chat over newline-terminated text on TCP: accounts, private
//! messages, broadcasts, and named groups. The server keeps the live
//! session registry in memory and delegates persistence, publication, and
//! password hashing to injected services.
//!
//! # Architecture
//!
//! Every accepted connection gets a reader task and a writer task (see
//! [`run_connection`]). The reader hands each line to the shared
//! [`Dispatcher`], which calls the store, the bus, and the registry
//! synchronously and queues outbound lines on per-connection bounded queues.
//! No task ever waits on another connection's socket.
//!
//! # Components
//!
//! - [`Dispatcher`]: command parsing, authentication state, routing
//! - [`MessagingEngine`]: private, broadcast, system, and group delivery
//! - [`GroupCoordinator`]: group create/join/leave/list
//! - [`SessionRegistry`]: who is connected, the liveness source of truth
//! - [`Storage`]: accounts, groups, and memberships ([`MemoryStorage`],
//!   [`RedbStorage`], [`ChaoticStorage`])
//! - [`MessageBus`]: fire-and-forget publication ([`LocalBus`],
//!   [`MemoryBus`])
//! - [`CredentialHasher`]: password digests ([`Argon2Hasher`])
//! - [`Server`]: TCP accept loop

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
mod config;
mod connection;
mod dispatcher;
mod driver;
mod error;
mod groups;
mod hasher;
mod messaging;
mod registry;
pub mod storage;
mod transport;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

pub use bus::{BusMessage, LocalBus, MemoryBus, MessageBus};
pub use config::{ConnectionConfig, ServerConfig};
pub use connection::{ConnectionHandle, ConnectionId, DeliveryFailure};
pub use dispatcher::{Dispatcher, Session, SessionState};
pub use driver::run_connection;
pub use error::{ChatError, Existing, Missing, ServerError};
pub use groups::GroupCoordinator;
pub use hasher::{Argon2Hasher, CredentialHasher, HashConfig, HashError};
use huddle_proto::reply;
pub use messaging::MessagingEngine;
pub use registry::{ConnectionRegistry, LocalRegistry, SessionRegistry};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
use tokio::{io::AsyncWriteExt, net::TcpStream};
pub use transport::TcpTransport;

/// Production Huddle server.
///
/// Owns the listener and the dispatcher shared by every connection task.
pub struct Server<S: Storage, B: MessageBus> {
    transport: TcpTransport,
    dispatcher: Arc<Dispatcher<S, B>>,
    config: ServerConfig,
    next_connection: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl<S: Storage, B: MessageBus> Server<S, B> {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// - `Config` if the bind address or the hash costs are invalid
    /// - `Transport` if the address cannot be bound
    pub async fn bind(config: ServerConfig, storage: S, bus: B) -> Result<Self, ServerError> {
        let hasher = Argon2Hasher::new(config.hash)?;
        let registry: Arc<dyn SessionRegistry> = Arc::new(LocalRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(storage, bus, registry, Arc::new(hasher)));

        let transport = TcpTransport::bind(&config.bind_address).await?;

        Ok(Self {
            transport,
            dispatcher,
            config,
            next_connection: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Run the server, accepting connections until the task is dropped.
    ///
    /// Accept errors are logged and the loop continues.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Session registry, for inspection.
    pub fn registry(&self) -> Arc<dyn SessionRegistry> {
        Arc::clone(self.dispatcher.registry())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if self.active.fetch_add(1, Ordering::SeqCst) >= self.config.max_connections {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(
                %peer,
                limit = self.config.max_connections,
                "rejecting connection, server full"
            );
            tokio::spawn(reject(stream));
            return;
        }

        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let dispatcher = Arc::clone(&self.dispatcher);
        let active = ActiveConnection(Arc::clone(&self.active));
        let config = self.config.connection;

        tracing::info!(connection = %id, %peer, "accepted connection");

        tokio::spawn(async move {
            let _active = active;
            run_connection(stream, id, dispatcher, config).await;
        });
    }
}

/// Decrements the live connection count when the connection task ends.
struct ActiveConnection(Arc<AtomicUsize>);

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn reject(mut stream: TcpStream) {
    let line = format!("{}\n", reply::SERVER_FULL);
    if let Err(e) = stream.write_all(line.as_bytes()).await {
        tracing::debug!(error = %e, "failed to send server full notice");
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(error = %e, "failed to close rejected connection");
    }
}
