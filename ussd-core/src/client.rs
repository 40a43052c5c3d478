//! One logon-to-teardown run of the gateway link.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::UssdCodec;
use crate::dispatch::{DispatchTiming, Dispatcher, Responder};
use crate::error::UssdError;
use crate::header::LengthMode;
use crate::metrics::MetricsReporter;
use crate::network::{Connection, ConnectionInfo};
use crate::resolver::MenuResolver;
use crate::session::{self, Credentials, KeepaliveScheduler};
use crate::state::ConnectionPhase;
use crate::task::DialogPool;

/// Everything needed to run one session.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub gateway: ConnectionInfo,
    pub credentials: Credentials,
    pub length_mode: LengthMode,
    pub read_timeout: Duration,
    pub logon_timeout: Duration,
    pub keepalive_interval: Duration,
    pub idle_backoff: Duration,
    pub resolve_timeout: Duration,
    pub max_concurrent_dialogs: usize,
    pub write_queue_depth: usize,
    /// How long shutdown waits for in-flight dialogs and queued writes.
    pub drain_timeout: Duration,
}

impl ClientOptions {
    pub fn new(gateway: ConnectionInfo, credentials: Credentials) -> Self {
        Self {
            gateway,
            credentials,
            length_mode: LengthMode::default(),
            read_timeout: Duration::from_secs(5),
            logon_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(20),
            idle_backoff: Duration::from_secs(1),
            resolve_timeout: Duration::from_secs(8),
            max_concurrent_dialogs: 64,
            write_queue_depth: 128,
            drain_timeout: Duration::from_secs(10),
        }
    }

    fn dispatch_timing(&self) -> DispatchTiming {
        DispatchTiming {
            read_timeout: self.read_timeout,
            idle_backoff: self.idle_backoff,
        }
    }
}

/// The gateway client: logs on, keeps the link alive and answers
/// dialog events until cancelled or the link fails.
///
/// There is no reconnection. A fatal error ends [`run`](Self::run) and
/// is returned to the caller.
pub struct UssdClient {
    options: ClientOptions,
    resolver: Arc<dyn MenuResolver>,
    metrics: MetricsReporter,
    phase: Arc<RwLock<ConnectionPhase>>,
}

impl UssdClient {
    pub fn new(
        options: ClientOptions,
        resolver: Arc<dyn MenuResolver>,
        metrics: MetricsReporter,
    ) -> Self {
        Self {
            options,
            resolver,
            metrics,
            phase: Arc::new(RwLock::new(ConnectionPhase::Disconnected)),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.phase.read().await.clone()
    }

    /// Dial the configured gateway and run the session on it.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), UssdError> {
        self.phase.write().await.begin_connect()?;
        info!(gateway = %self.options.gateway, "connecting");

        let conn = match Connection::connect(
            &self.options.gateway,
            UssdCodec::new(self.options.length_mode),
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                error!(gateway = %self.options.gateway, "connect failed: {e}");
                self.phase.write().await.force_disconnect();
                return Err(e);
            }
        };
        info!(gateway = %self.options.gateway, "connected");
        self.session(conn, shutdown).await
    }

    /// Run the session over an already open stream.
    pub async fn run_on<S>(&self, stream: S, shutdown: CancellationToken) -> Result<(), UssdError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.phase.write().await.begin_connect()?;
        let conn = Connection::new(stream, UssdCodec::new(self.options.length_mode));
        self.session(conn, shutdown).await
    }

    async fn session<S>(
        &self,
        mut conn: Connection<S>,
        shutdown: CancellationToken,
    ) -> Result<(), UssdError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let opts = &self.options;
        self.phase.write().await.begin_logon()?;

        let session_key =
            match session::logon(&mut conn, &opts.credentials, opts.logon_timeout).await {
                Ok(key) => key,
                Err(e) => {
                    error!("logon failed: {e}");
                    self.phase.write().await.force_disconnect();
                    return Err(e);
                }
            };
        self.phase.write().await.complete_logon(session_key)?;

        // Cancelled by the caller, or by the writer when the link dies.
        let (guard, reader) = conn.into_guard(shutdown.child_token(), opts.write_queue_depth);
        let link_down = guard.shutdown_token();

        let pool = DialogPool::new(opts.max_concurrent_dialogs);
        let responder = Arc::new(Responder::new(
            guard.sender(),
            self.resolver.clone(),
            self.metrics.clone(),
            opts.resolve_timeout,
        ));
        let keepalive =
            KeepaliveScheduler::new(guard.sender(), session_key, opts.keepalive_interval);
        let dispatcher = Dispatcher::new(reader, responder, pool.clone(), opts.dispatch_timing());

        let outcome = tokio::select! {
            result = keepalive.run(link_down.clone()) => result,
            result = dispatcher.run(link_down.clone()) => result,
        };
        guard.shutdown();
        self.phase.write().await.begin_close()?;

        if let Err(e) = &outcome {
            error!(session_key = %session_key, "session ended: {e}");
        } else {
            info!(session_key = %session_key, "shutting down");
        }

        if !pool.drain_timeout(opts.drain_timeout).await {
            warn!(in_flight = pool.in_flight(), "dialogs still running at close");
        }
        let closed = guard.close(opts.drain_timeout).await;
        self.phase.write().await.finish_close()?;
        info!("disconnected");

        outcome.and(closed)
    }
}
