use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as Json;

use weft_core::errors::TransportError;
use weft_core::ids::IriId;
use weft_core::session::{SearchKind, Session};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for an HTTP session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Bearer token sent on every request and carried by push URLs.
    pub token: Option<SecretString>,
    /// Endpoint queried by `search`, typically the server's search route.
    pub search_url: String,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token: None,
            search_url: String::new(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Production session over reqwest. Objects and context documents are
/// requested as `application/ld+json`; any configured token rides along as
/// a bearer header, and gets appended to push URLs as a query parameter
/// because EventSource-style consumers cannot set headers.
pub struct HttpSession {
    client: Client,
    config: SessionConfig,
}

impl HttpSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(config.connect_timeout)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.header(
                "authorization",
                format!("Bearer {}", token.expose_secret()),
            ),
            None => req,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Json, TransportError> {
        let req = self
            .client
            .get(url)
            .header("accept", "application/ld+json");

        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::from_status(resp.status().as_u16(), url));
        }

        resp.json().await.map_err(|e| TransportError::Payload {
            url: url.to_owned(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn fetch_object(&self, id: &IriId) -> Result<Json, TransportError> {
        tracing::debug!(id = %id, "fetching object");
        self.get_json(id.as_str()).await
    }

    async fn fetch_document(&self, url: &str) -> Result<Json, TransportError> {
        self.get_json(url).await
    }

    async fn search(&self, kind: SearchKind, query: &str) -> Result<Vec<Json>, TransportError> {
        let url = &self.config.search_url;
        let req = self
            .client
            .get(url)
            .query(&[("type", kind.as_str()), ("data", query)]);

        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::from_status(resp.status().as_u16(), url));
        }

        let body: Json = resp.json().await.map_err(|e| TransportError::Payload {
            url: url.clone(),
            detail: e.to_string(),
        })?;
        match body {
            Json::Array(items) => Ok(items),
            other => Err(TransportError::Payload {
                url: url.clone(),
                detail: format!("expected a result array, got {other}"),
            }),
        }
    }

    fn push_url(&self, collection: &IriId) -> String {
        match &self.config.token {
            Some(token) => format!("{collection}?authorization={}", token.expose_secret()),
            None => collection.to_string(),
        }
    }
}
