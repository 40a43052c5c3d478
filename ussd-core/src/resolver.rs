//! HTTP client for the menu service that decides what a subscriber sees.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UssdError;
use crate::message::UssdRequest;

/// What the menu service needs to answer one dialog step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuQuery {
    pub shortcode: String,
    pub phone: String,
    pub input: String,
    pub session_id: String,
}

impl MenuQuery {
    pub fn from_request(request: &UssdRequest) -> Self {
        Self {
            shortcode: request.shortcode(),
            phone: request.msisdn.clone(),
            input: request.user_data.clone().unwrap_or_default(),
            session_id: request.request_id.clone(),
        }
    }
}

/// Menu text plus the continuation decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuReply {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "continue", default)]
    pub keep_open: bool,
}

#[async_trait]
pub trait MenuResolver: Send + Sync {
    async fn resolve(&self, query: &MenuQuery) -> Result<MenuReply, UssdError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSettings {
    pub url: String,
    pub telco: String,
    pub product_id: u32,
    pub timeout: Duration,
}

impl Default for MenuSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            telco: "MTN".into(),
            product_id: 2,
            timeout: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Serialize)]
struct MenuRequestBody<'a> {
    telco: &'a str,
    shortcode: &'a str,
    product_id: u32,
    phone: &'a str,
    input: &'a str,
    session_id: &'a str,
}

/// [`MenuResolver`] that POSTs JSON to the configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpMenuResolver {
    client: Client,
    settings: MenuSettings,
}

impl HttpMenuResolver {
    pub fn new(settings: MenuSettings) -> Result<Self, UssdError> {
        if settings.url.is_empty() {
            return Err(UssdError::Config("menu service url not set".into()));
        }
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    pub fn with_client(client: Client, settings: MenuSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl MenuResolver for HttpMenuResolver {
    async fn resolve(&self, query: &MenuQuery) -> Result<MenuReply, UssdError> {
        let body = MenuRequestBody {
            telco: &self.settings.telco,
            shortcode: &query.shortcode,
            product_id: self.settings.product_id,
            phone: &query.phone,
            input: &query.input,
            session_id: &query.session_id,
        };
        debug!(msisdn = %query.phone, request_id = %query.session_id, "menu request");

        let response = self
            .client
            .post(&self.settings.url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UssdError::Resolver(format!("menu service returned {status}")));
        }

        let text = response.text().await?;
        debug!(request_id = %query.session_id, body = %text, "menu response");
        serde_json::from_str(&text)
            .map_err(|e| UssdError::Resolver(format!("unparsable menu response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> UssdRequest {
        UssdRequest {
            request_id: "R1".into(),
            msisdn: "2348011112222".into(),
            star_code: "123".into(),
            msg_type: 1,
            user_data: Some("1".into()),
            ..Default::default()
        }
    }

    fn resolver(server: &MockServer) -> HttpMenuResolver {
        HttpMenuResolver::new(MenuSettings {
            url: format!("{}/ussd/menu", server.uri()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn query_from_request() {
        let query = MenuQuery::from_request(&request());
        assert_eq!(query.shortcode, "*123#");
        assert_eq!(query.phone, "2348011112222");
        assert_eq!(query.input, "1");
        assert_eq!(query.session_id, "R1");
    }

    #[test]
    fn missing_url_is_config_error() {
        assert!(matches!(
            HttpMenuResolver::new(MenuSettings::default()),
            Err(UssdError::Config(_))
        ));
    }

    #[tokio::test]
    async fn posts_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ussd/menu"))
            .and(body_json(serde_json::json!({
                "telco": "MTN",
                "shortcode": "*123#",
                "product_id": 2,
                "phone": "2348011112222",
                "input": "1",
                "session_id": "R1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Menu text",
                "continue": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = resolver(&server)
            .resolve(&MenuQuery::from_request(&request()))
            .await
            .unwrap();
        assert_eq!(reply.message, "Menu text");
        assert!(reply.keep_open);
    }

    #[tokio::test]
    async fn missing_fields_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let reply = resolver(&server)
            .resolve(&MenuQuery::from_request(&request()))
            .await
            .unwrap();
        assert_eq!(reply, MenuReply::default());
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = resolver(&server)
            .resolve(&MenuQuery::from_request(&request()))
            .await
            .unwrap_err();
        assert!(matches!(err, UssdError::Resolver(_)));
    }

    #[tokio::test]
    async fn garbage_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = resolver(&server)
            .resolve(&MenuQuery::from_request(&request()))
            .await
            .unwrap_err();
        assert!(matches!(err, UssdError::Resolver(_)));
    }
}
