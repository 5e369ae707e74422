use crate::dsn::Dsn;
use crate::event::TelemetryEvent;
use crate::sink::TelemetrySink;
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error;

/// Configuration for [`HttpSink`].
#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    pub dsn: Dsn,
    /// Value of the `User-Agent` header sent with every submission.
    pub user_agent: String,
}

impl HttpSinkConfig {
    pub fn new(dsn: Dsn) -> Self {
        Self {
            dsn,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`TelemetrySink`] posting each event as JSON to the store endpoint
/// derived from the DSN.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    config: HttpSinkConfig,
    endpoint: String,
}

impl HttpSink {
    /// Construct a new sink instance using the provided configuration.
    pub fn new(config: HttpSinkConfig) -> Self {
        let client = Client::new();
        let endpoint = config.dsn.store_endpoint();
        Self {
            client,
            config,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn send(&self, event: &TelemetryEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let body = serde_json::to_vec(event)?;
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .body(body)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("event submission failed with status {}: {}", status, text).into())
        }
    }
}
