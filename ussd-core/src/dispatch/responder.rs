use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{UssdError, ValidationError};
use crate::frame::Frame;
use crate::header::SessionKey;
use crate::message::{UssdRequest, UssdResponse};
use crate::metrics::{MetricEvent, MetricsReporter};
use crate::network::FrameSender;
use crate::resolver::{MenuQuery, MenuResolver};

/// How one dialog event ended. Only `Replied` put a frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Replied { end_of_session: bool },
    /// The gateway flagged the event with an error code.
    Errored(String),
    /// The subscriber session already ended upstream.
    Ended,
    Rejected(ValidationError),
    ResolverFailed(String),
    SendFailed(String),
}

impl DialogOutcome {
    pub fn replied(&self) -> bool {
        matches!(self, Self::Replied { .. })
    }
}

/// Answers one inbound dialog event with zero or one reply frame.
pub struct Responder {
    sender: FrameSender,
    resolver: Arc<dyn MenuResolver>,
    metrics: MetricsReporter,
    resolve_timeout: Duration,
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("metrics", &self.metrics)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

impl Responder {
    pub fn new(
        sender: FrameSender,
        resolver: Arc<dyn MenuResolver>,
        metrics: MetricsReporter,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            resolver,
            metrics,
            resolve_timeout,
        }
    }

    pub async fn handle(&self, request: UssdRequest) -> DialogOutcome {
        let msisdn = request.msisdn.as_str();
        let request_id = request.request_id.as_str();

        if let Some(code) = request.error() {
            info!(msisdn, request_id, error_code = code, "gateway reported error; dropping event");
            return DialogOutcome::Errored(code.to_string());
        }
        if request.is_end_of_session() {
            info!(msisdn, request_id, "USSD session ended");
            return DialogOutcome::Ended;
        }

        self.metrics.report(MetricEvent::new("new", msisdn, request_id));

        if let Err(e) = request.validate() {
            warn!(msisdn, request_id, msg_type = request.msg_type, "rejecting event: {e}");
            return DialogOutcome::Rejected(e);
        }
        info!(msisdn, request_id, "continuing USSD session");

        let query = MenuQuery::from_request(&request);
        let resolved = tokio::time::timeout(self.resolve_timeout, self.resolver.resolve(&query));
        let reply = match resolved.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return self.resolver_failed(&request, e),
            Err(_) => {
                return self.resolver_failed(&request, UssdError::Timeout(self.resolve_timeout));
            }
        };
        debug!(request_id, keep_open = reply.keep_open, "menu resolved");

        let response = UssdResponse::reply_to(&request, reply.message, reply.keep_open);
        let end_of_session = response.is_end_of_session();
        if let Err(e) = self.send(&response).await {
            error!(msisdn, request_id, "failed to send reply: {e}");
            self.metrics.report(
                MetricEvent::new("Failed to send ussd request message", msisdn, request_id)
                    .with_error(&e),
            );
            return DialogOutcome::SendFailed(e.to_string());
        }

        info!(msisdn, request_id, end_of_session, "reply sent");
        DialogOutcome::Replied { end_of_session }
    }

    async fn send(&self, response: &UssdResponse) -> Result<(), UssdError> {
        let key = SessionKey::truncated(&response.request_id);
        let frame = Frame::xml(key, response.to_xml()?);
        self.sender.send(frame).await
    }

    fn resolver_failed(&self, request: &UssdRequest, e: UssdError) -> DialogOutcome {
        error!(
            msisdn = %request.msisdn,
            request_id = %request.request_id,
            "failed to get USSD menu: {e}"
        );
        self.metrics.report(
            MetricEvent::new("Failed to get USSD menu", &request.msisdn, &request.request_id)
                .with_error(&e),
        );
        DialogOutcome::ResolverFailed(e.to_string())
    }
}
