//! Listener and lifecycle manager with deferred startup.
//!
//! Follows the deferred startup pattern: `new()` allocates shared state,
//! `start()` loads the TLS configuration and binds the listener, and
//! `serve()` accepts connections until shutdown is signalled, then drains.
//! This separation lets operation authors register handlers on the shared
//! router between construction and the first accept.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpSocket};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::connection::ConnectionRegistry;
use super::handler::{self, FrameLimits};
use super::shutdown::ShutdownController;
use super::tls::{self, TlsError};
use crate::service::operation::panic_message;
use crate::service::OperationRouter;

/// Errors from binding or running the listener.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("invalid listen address {0}")]
    InvalidAddr(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Manages the full server lifecycle.
///
/// 1. `new()` -- allocates the router, connection registry, and shutdown
///    controller
/// 2. `start()` -- loads TLS material and binds to the configured address
/// 3. `serve()` -- accepts connections until shutdown, then drains
///
/// The router, registry, and shutdown controller are shared via `Arc` so
/// callers can register operations, observe connections, and trigger
/// shutdown after construction. `serve()` returning is the stop contract:
/// every accepted connection has completed its exchange by then (subject
/// to the configured drain bound).
pub struct Server {
    config: ServerConfig,
    listener: Option<TcpListener>,
    acceptor: Option<TlsAcceptor>,
    router: Arc<OperationRouter>,
    connections: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownController>,
}

impl Server {
    /// Creates a new server without binding any port.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            listener: None,
            acceptor: None,
            router: Arc::new(OperationRouter::new()),
            connections: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns the shared operation router.
    ///
    /// Operation authors register handlers here any time before traffic
    /// begins.
    #[must_use]
    pub fn router(&self) -> Arc<OperationRouter> {
        Arc::clone(&self.router)
    }

    /// Returns the shared connection registry.
    #[must_use]
    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.connections)
    }

    /// Returns the shared shutdown controller.
    ///
    /// Calling `trigger_shutdown()` on it stops new accepts; await
    /// `serve()`'s completion for the drain guarantee.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Loads the TLS configuration and binds the listener.
    ///
    /// The socket is bound with the configured backlog -- the OS accept
    /// queue is the only admission control. Returns the actual bound
    /// port, which differs from the configured one when port 0 is used
    /// (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS material cannot be loaded or the
    /// address cannot be bound.
    pub async fn start(&mut self) -> Result<u16, ServeError> {
        let tls_config = tls::load_server_config(&self.config.tls)?;

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = addr.parse().map_err(|_| ServeError::InvalidAddr(addr))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }?;
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .map_err(|source| ServeError::Bind { addr, source })?;
        let listener = socket.listen(self.config.backlog)?;
        let port = listener.local_addr()?.port();

        info!(
            host = %self.config.host,
            port,
            backlog = self.config.backlog,
            "TCP listener bound"
        );

        self.listener = Some(listener);
        self.acceptor = Some(TlsAcceptor::from(tls_config));
        Ok(port)
    }

    /// Accepts connections until shutdown is triggered, then drains.
    ///
    /// One handler task is spawned per accepted socket; task failures are
    /// caught at the tracking layer, logged, and never abort the accept
    /// loop or other connections. After the shutdown signal the loop
    /// stops issuing new accepts immediately (a socket already queued by
    /// the OS may win the race once -- it is drained like any other),
    /// releases the listener, and waits for in-flight connections per
    /// `drain_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error only on a fatal listener I/O failure; individual
    /// accept errors are logged and retried.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(self) -> Result<(), ServeError> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let acceptor = self
            .acceptor
            .expect("start() must be called before serve()");
        let router = self.router;
        let connections = self.connections;
        let shutdown = self.shutdown;
        let config = self.config;

        let limits = FrameLimits {
            max_request_bytes: config.max_request_bytes,
            max_response_bytes: config.max_response_bytes,
        };

        let mut signal = shutdown.shutdown_receiver();
        shutdown.set_ready();
        info!("accepting connections");

        while !*signal.borrow_and_update() {
            tokio::select! {
                changed = signal.changed() => {
                    // Sender dropping counts as shutdown too.
                    if changed.is_err() || *signal.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => spawn_connection(
                            stream,
                            peer_addr,
                            &acceptor,
                            &router,
                            &connections,
                            &shutdown,
                            limits,
                        ),
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
            }
        }

        // Stop accepting before draining: the OS queue dies with the listener.
        drop(listener);
        drain(&connections, &shutdown, config.drain_timeout).await;
        Ok(())
    }
}

/// Registers and spawns one connection handler task.
fn spawn_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    acceptor: &TlsAcceptor,
    router: &Arc<OperationRouter>,
    connections: &Arc<ConnectionRegistry>,
    shutdown: &ShutdownController,
    limits: FrameLimits,
) {
    let handle = connections.register(peer_addr);
    // Guard taken here, before the spawn: drain cannot observe zero while
    // this connection is still untracked.
    let guard = shutdown.in_flight_guard();
    let acceptor = acceptor.clone();
    let router = Arc::clone(router);
    let connections = Arc::clone(connections);

    debug!(connection = handle.id.0, %peer_addr, "connection accepted");

    tokio::spawn(async move {
        let _guard = guard;
        let run = handler::run(stream, peer_addr, acceptor, router, limits);
        if let Err(panic) = AssertUnwindSafe(run).catch_unwind().await {
            // Failure isolation: log at the tracking layer, never propagate.
            error!(
                connection = handle.id.0,
                %peer_addr,
                panic = panic_message(panic.as_ref()),
                "connection handler failed"
            );
        }
        connections.remove(handle.id);
        debug!(connection = handle.id.0, "connection closed");
    });
}

/// Waits for in-flight connections after the shutdown signal.
async fn drain(
    connections: &ConnectionRegistry,
    shutdown: &ShutdownController,
    timeout: Option<Duration>,
) {
    // Idempotent when the signal already fired: serve() can also exit
    // because the controller's sender side saw an external trigger.
    shutdown.trigger_shutdown();

    let active = connections.count();
    if active > 0 {
        info!(active, "draining connections");
    }

    if shutdown.wait_for_drain(timeout).await {
        info!("all connections drained");
    } else {
        warn!(
            remaining = shutdown.in_flight_count(),
            "drain timeout expired with connections still in flight"
        );
    }
}
