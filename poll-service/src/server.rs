use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, select, sync::watch};
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditLog, LogMode},
    connection::{self, SharedState},
    pool::WorkerPool,
    store::VoteStore,
};

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_POOL_SIZE: usize = 20;
pub const DEFAULT_LOG_FILE: &str = "log.txt";
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// Pause after a failed accept so persistent errors (e.g. fd exhaustion) don't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of a [`Server`], observable through [`Server::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Built and bound, accept loop not yet running.
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub pool_size: usize,
    pub log_file: PathBuf,
    pub log_mode: LogMode,
    pub idle_timeout: Option<Duration>,
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            pool_size: DEFAULT_POOL_SIZE,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_mode: LogMode::default(),
            idle_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    shared: Arc<SharedState>,
    pool: WorkerPool,
    drain_timeout: Duration,
    state: watch::Sender<ServerState>,
}

impl Server {
    /// Builds the poll, binds the listening socket and opens the audit log.
    pub async fn start<I, S>(options: I, config: &ServerConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = VoteStore::new(options).context("invalid poll options")?;
        // Bind before opening the log so a failed start leaves the file alone.
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("could not listen on {}", config.listen))?;
        let audit = AuditLog::open(&config.log_file, config.log_mode)
            .await
            .with_context(|| format!("failed to open log file {}", config.log_file.display()))?;

        Self::new(listener, store, audit, config)
    }

    /// Assembles a server around an already bound listener.
    pub fn new(
        listener: TcpListener,
        store: VoteStore,
        audit: AuditLog,
        config: &ServerConfig,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.pool_size)?;
        let (state, _) = watch::channel(ServerState::Created);

        Ok(Self {
            listener,
            shared: Arc::new(SharedState {
                store: Arc::new(store),
                audit,
                idle_timeout: config.idle_timeout,
            }),
            pool,
            drain_timeout: config.drain_timeout,
            state,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the live tallies.
    pub fn store(&self) -> Arc<VoteStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Accepts connections until `shutdown` resolves, then shuts down.
    ///
    /// Each connection goes to the worker pool; while every worker is busy the
    /// loop waits for a free one before accepting again.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            shared,
            mut pool,
            drain_timeout,
            state,
        } = self;
        tokio::pin!(shutdown);

        state.send_replace(ServerState::Listening);
        debug!(workers = pool.size(), "accept loop started");

        loop {
            let accepted = select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(error = ?err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            debug!(%peer, in_flight = pool.in_flight(), "accepted connection");
            let job = connection::serve(stream, peer, Arc::clone(&shared));
            select! {
                _ = &mut shutdown => break,
                submitted = pool.submit(job) => {
                    if let Err(err) = submitted {
                        warn!(error = %err, "dropping connection");
                        break;
                    }
                }
            }
        }

        state.send_replace(ServerState::ShuttingDown);
        info!("poll server shutting down");

        drop(listener);
        pool.shutdown(drain_timeout).await;
        if let Err(err) = shared.audit.close().await {
            warn!(error = %err, "failed to close audit log");
        }

        state.send_replace(ServerState::Stopped);
        info!("poll server stopped");
        Ok(())
    }

    /// Runs until Ctrl-C (or SIGTERM on Unix).
    pub async fn run_until_signal(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
