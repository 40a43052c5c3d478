//! Wires configuration into the core client and runs it once.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use ussd_core::{
    ConnectionPhase, HttpMenuResolver, MenuResolver, MetricsReporter, UssdClient, UssdError,
};

use crate::config::ClientConfig;

// ── GatewayService ───────────────────────────────────────────────

/// The context object for one process: validated configuration plus
/// the collaborators built from it, handed to the core client.
pub struct GatewayService {
    client: UssdClient,
    shutdown: CancellationToken,
}

impl GatewayService {
    /// Validate `config` and build the menu resolver, metrics reporter
    /// and client.
    pub fn new(config: &ClientConfig) -> Result<Self, UssdError> {
        config.validate()?;
        let resolver: Arc<dyn MenuResolver> =
            Arc::new(HttpMenuResolver::new(config.menu_settings())?);
        Self::with_resolver(config, resolver)
    }

    /// Like [`new`](Self::new) but with a caller-supplied menu resolver.
    pub fn with_resolver(
        config: &ClientConfig,
        resolver: Arc<dyn MenuResolver>,
    ) -> Result<Self, UssdError> {
        let metrics = MetricsReporter::new(config.metrics_settings())?;
        if !metrics.is_enabled() {
            info!("monitoring disabled");
        }
        Ok(Self {
            client: UssdClient::new(config.to_client_options(), resolver, metrics),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the service when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.client.phase().await
    }

    /// Run until stopped or the link fails. There is no reconnection.
    pub async fn run(&self) -> Result<(), UssdError> {
        info!(gateway = %self.client.options().gateway, "starting gateway client");
        self.client.run(self.shutdown.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ussd_core::{Connection, Frame, MenuQuery, MenuReply, SessionKey, UssdCodec};

    struct Echo;

    #[async_trait::async_trait]
    impl MenuResolver for Echo {
        async fn resolve(&self, query: &MenuQuery) -> Result<MenuReply, UssdError> {
            Ok(MenuReply {
                message: query.input.clone(),
                keep_open: true,
            })
        }
    }

    #[test]
    fn incomplete_config_is_rejected() {
        assert!(matches!(
            GatewayService::new(&ClientConfig::default()),
            Err(UssdError::Config(_))
        ));
    }

    #[tokio::test]
    async fn runs_until_stopped() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ClientConfig::default();
        config.gateway.host = "127.0.0.1".into();
        config.gateway.port = listener.local_addr().unwrap().port();
        config.timing.read_timeout_ms = 100;
        config.timing.idle_backoff_ms = 10;

        let service = Arc::new(GatewayService::with_resolver(&config, Arc::new(Echo)).unwrap());
        let run = tokio::spawn({
            let service = service.clone();
            async move { service.run().await }
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut gateway = Connection::new(stream, UssdCodec::default());
        gateway.recv(Duration::from_secs(5)).await.unwrap();
        gateway
            .send(Frame::xml(SessionKey::new("K1").unwrap(), "<AUTHResponse/>".into()))
            .await
            .unwrap();

        for _ in 0..100 {
            if service.phase().await.is_online() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(service.phase().await.is_online());

        service.stop();
        run.await.unwrap().unwrap();
    }
}
