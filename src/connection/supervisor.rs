//! Connection Supervisor
//!
//! Accepts one client at a time, connects it to the destination and services
//! the resulting pair of relay sessions until either direction ends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::log_sink::LogSink;
use crate::relay::{MessageDispatcher, RelayEngine, RelaySession, SessionStats, TypeRegistry};

pub const UPSTREAM: &str = "upstream";
pub const DOWNSTREAM: &str = "downstream";

/// Statistics for one serviced pair.
#[derive(Debug, Clone)]
pub struct PairStats {
    pub upstream: Option<SessionStats>,
    pub downstream: Option<SessionStats>,
    /// The pair was torn down by process shutdown rather than by a session exit.
    pub interrupted: bool,
}

/// Owns the listener and everything the sessions share.
pub struct Supervisor {
    listener: TcpListener,
    engine: RelayEngine,
    dispatcher: MessageDispatcher,
    sink: Arc<LogSink>,
    teardown_grace: Duration,
    tcp_nodelay: bool,
    pairs_served: AtomicU64,
}

impl Supervisor {
    /// Bind the listener described by `config`.
    pub async fn bind(config: &Config, sink: Arc<LogSink>) -> Result<Self, RelayError> {
        let bind_addr = config.relay.listen_socket_addr()?;

        info!("Binding TCP listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr).await?;
        info!("Successfully bound to {}", bind_addr);

        Ok(Self::from_listener(listener, config, sink))
    }

    pub fn from_listener(listener: TcpListener, config: &Config, sink: Arc<LogSink>) -> Self {
        let dispatcher = MessageDispatcher::new(
            Arc::new(TypeRegistry::with_defaults()),
            Arc::new(config.blacklist()),
        )
        .with_max_decode_body_size(config.relay.max_decode_body_size);

        Self {
            listener,
            engine: RelayEngine::from_config(&config.relay),
            dispatcher,
            sink,
            teardown_grace: config.relay.teardown_grace,
            tcp_nodelay: config.relay.tcp_nodelay,
            pairs_served: AtomicU64::new(0),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of pairs serviced to completion.
    pub fn pairs_served(&self) -> u64 {
        self.pairs_served.load(Ordering::Relaxed)
    }

    /// Accept loop. Runs until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), RelayError> {
        info!(
            "Relaying {} <-> {} (blocked: {:?})",
            self.local_addr()?,
            self.engine.target(),
            self.dispatcher.filter().types()
        );

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((client, addr)) => {
                            info!("Accepted connection from {}", addr);
                            match self.handle_connection(client, addr, &mut shutdown).await {
                                Ok(stats) if stats.interrupted => {
                                    info!("Pair from {} torn down by shutdown", addr);
                                    break;
                                }
                                Ok(_) => {}
                                Err(e) => error!("Connection from {} failed: {}", addr, e),
                            }
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        info!("Connection acceptance loop stopped");
        Ok(())
    }

    async fn handle_connection(
        &self,
        client: TcpStream,
        addr: SocketAddr,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<PairStats, RelayError> {
        if self.tcp_nodelay {
            if let Err(e) = client.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }
        }

        // A failed connect drops the client and leaves the accept loop running.
        let (server, server_addr) = self.engine.connect_to_destination().await?;
        info!("Pairing {} with {}", addr, server_addr);

        let stats = self.relay_pair(client, server, shutdown).await?;
        self.pairs_served.fetch_add(1, Ordering::Relaxed);
        Ok(stats)
    }

    /// Run both directions between `client` and `server` and tear the pair
    /// down as soon as either one ends.
    pub async fn relay_pair<C, S>(
        &self,
        client: C,
        server: S,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<PairStats, RelayError>
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut upstream = RelaySession::new(
            UPSTREAM,
            client_read,
            server_write,
            self.dispatcher.clone(),
            Arc::clone(&self.sink),
        );
        let mut downstream = RelaySession::new(
            DOWNSTREAM,
            server_read,
            client_write,
            self.dispatcher.clone(),
            Arc::clone(&self.sink),
        );

        upstream.start()?;
        downstream.start()?;

        let interrupted = tokio::select! {
            _ = upstream.wait_stopped() => {
                debug!("Upstream ended first");
                false
            }
            _ = downstream.wait_stopped() => {
                debug!("Downstream ended first");
                false
            }
            _ = shutdown.recv() => true,
        };

        upstream.stop();
        downstream.stop();

        let both_stopped = async {
            tokio::join!(upstream.wait_stopped(), downstream.wait_stopped());
        };
        if timeout(self.teardown_grace, both_stopped).await.is_err() {
            warn!(
                "Pair did not stop within {:?}, closing its streams",
                self.teardown_grace
            );
            upstream.abort();
            downstream.abort();
        }

        let upstream_stats = upstream.join().await;
        let downstream_stats = downstream.join().await;
        for stats in upstream_stats.iter().chain(downstream_stats.iter()) {
            stats.log_stats();
        }
        self.sink.flush();

        Ok(PairStats {
            upstream: upstream_stats,
            downstream: downstream_stats,
            interrupted,
        })
    }
}
