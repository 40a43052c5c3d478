//! Fire-and-forget dialog counters posted to the monitoring service.
//!
//! Every continuing dialog event bumps the count channel; resolver and
//! send failures bump the failure channel. Delivery problems are logged
//! and never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::UssdError;

const POST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub count_channel: String,
    pub failure_channel: String,
}

/// One reportable dialog event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub status: String,
    pub error: Option<String>,
    pub msisdn: String,
    pub request_id: String,
}

impl MetricEvent {
    pub fn new(status: impl Into<String>, msisdn: &str, request_id: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
            msisdn: msisdn.to_string(),
            request_id: request_id.to_string(),
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    fn log_line(&self) -> String {
        format!(
            "Status: {}. Error: {}",
            self.status,
            self.error.as_deref().unwrap_or("None")
        )
    }
}

#[derive(Debug, Serialize)]
struct MetricBody<'a> {
    api_key: &'a str,
    metric: &'a str,
    value: u32,
    context_1: &'a str,
    context_2: &'a str,
    log: String,
}

#[derive(Debug)]
struct Inner {
    client: Client,
    settings: MetricsSettings,
}

/// Cheap to clone; a disabled reporter drops every event.
#[derive(Debug, Clone, Default)]
pub struct MetricsReporter {
    inner: Option<Arc<Inner>>,
}

impl MetricsReporter {
    /// Build a reporter. Disabled settings, or no url, give a reporter
    /// that does nothing.
    pub fn new(settings: MetricsSettings) -> Result<Self, UssdError> {
        if !settings.enabled || settings.url.is_empty() {
            return Ok(Self::disabled());
        }
        let client = Client::builder()
            .timeout(POST_TIMEOUT)
            .build()
            .map_err(|e| UssdError::Config(format!("metrics client: {e}")))?;
        Ok(Self {
            inner: Some(Arc::new(Inner { client, settings })),
        })
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Post `event` on a background task. Returns `None` when nothing
    /// is sent: reporting is off or the target channel is not set.
    pub fn report(&self, event: MetricEvent) -> Option<JoinHandle<()>> {
        let inner = self.inner.clone()?;
        let channel = if event.error.is_some() {
            &inner.settings.failure_channel
        } else {
            &inner.settings.count_channel
        };
        if channel.is_empty() {
            debug!(status = %event.status, "no monitoring channel configured");
            return None;
        }
        let channel = channel.clone();

        Some(tokio::spawn(async move {
            if let Err(e) = post(&inner, &channel, &event).await {
                warn!(
                    msisdn = %event.msisdn,
                    request_id = %event.request_id,
                    "metric post failed: {e}"
                );
            }
        }))
    }
}

async fn post(inner: &Inner, channel: &str, event: &MetricEvent) -> Result<(), UssdError> {
    let body = MetricBody {
        api_key: &inner.settings.api_key,
        metric: channel,
        value: 1,
        context_1: &event.msisdn,
        context_2: &event.request_id,
        log: event.log_line(),
    };
    let response = inner
        .client
        .post(&inner.settings.url)
        .json(&body)
        .send()
        .await
        .map_err(|e| UssdError::Other(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(UssdError::Other(format!("monitoring service returned {status}")));
    }
    debug!(metric = %channel, "metric posted");
    Ok(())
}
