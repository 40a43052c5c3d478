use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::{Credentials, RequestId};
use crate::error::UssdError;
use crate::frame::Frame;
use crate::header::SessionKey;
use crate::message::LogonRequest;
use crate::network::Connection;

/// Log on with a freshly generated request id.
pub async fn logon<S>(
    conn: &mut Connection<S>,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<SessionKey, UssdError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    logon_with_id(conn, credentials, &RequestId::generate(), timeout).await
}

/// Send the logon request keyed by `request_id` and wait up to `timeout`
/// for the answer.
///
/// The session key is whatever key the gateway puts on its response
/// frame; it need not match `request_id`. The response body is not
/// inspected.
pub async fn logon_with_id<S>(
    conn: &mut Connection<S>,
    credentials: &Credentials,
    request_id: &RequestId,
    timeout: Duration,
) -> Result<SessionKey, UssdError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let request = LogonRequest {
        request_id: request_id.to_string(),
        username: credentials.username.clone(),
        password: credentials.password.clone(),
        application_id: credentials.application_id.clone(),
    };
    let frame = Frame::xml(SessionKey::truncated(request_id.as_str()), request.to_xml()?);

    debug!(request_id = %request_id, "[SEND] logon request");
    conn.send(frame)
        .await
        .map_err(|e| UssdError::Handshake(format!("sending logon request: {e}")))?;

    let response = conn.recv(timeout).await.map_err(|e| match e {
        UssdError::Timeout(waited) => UssdError::HandshakeTimeout(waited),
        other => UssdError::Handshake(format!("reading logon response: {other}")),
    })?;

    let session_key = response.key();
    debug!(
        payload = %String::from_utf8_lossy(response.payload()),
        "[RECV] logon response"
    );
    info!(request_id = %request_id, session_key = %session_key, "logged on");
    Ok(session_key)
}
