use super::envelope::{ApiRequest, Envelope, Method};
use crate::config::ApiConfig;
use crate::error::{BoothError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Seam between the engines and the booth backend
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Envelope>;
}

/// Race `future` against `token`.
///
/// On cancellation the future is dropped, which closes the underlying
/// connection instead of merely ignoring the response.
pub async fn cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(BoothError::Cancelled),
        result = future => result,
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Envelope> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self
                .client
                .post(&url)
                .json(&request.body.unwrap_or_else(|| json!({}))),
        };

        let response = builder.query(&request.query).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        if !status.is_success() {
            let message = body
                .and_then(|b| Envelope::from_value(b).ok())
                .and_then(|e| e.message);
            return Err(BoothError::api(status.as_u16().to_string(), message));
        }

        Envelope::from_value(body.unwrap_or(Value::Null))?.into_result()
    }
}
