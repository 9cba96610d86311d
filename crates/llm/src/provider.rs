//! The provider seam and its HTTP implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use markpanel_core::model::{AnalysisOutcome, AnalysisResult, ChatMessage, Provider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::prompts::ANALYST_SYSTEM_PROMPT;
use crate::providers;
use crate::stream::{StreamAccumulator, StreamDecoder};

/// Endpoint, credentials and model of one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl ProviderSettings {
    /// Public endpoint and default model, no key.
    pub fn default_for(provider: Provider) -> Self {
        let (base_url, model) = providers::defaults(provider);
        Self {
            api_key: None,
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }
}

/// Readable explanation of an exhausted quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaNotice {
    pub error: String,
    pub details: String,
    pub fallback: String,
}

impl QuotaNotice {
    /// Text stored as the provider's outcome.
    pub fn summary(&self) -> String {
        format!("**{}**\n\n{}", self.error, self.details)
    }
}

/// Successful reply of a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Quota(QuotaNotice),
}

/// How a provider delivers its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One JSON document; the text sits at `text_pointer`.
    WholeBody { text_pointer: &'static str },
    /// Newline-delimited event records.
    Chunked(StreamDecoder),
}

/// One external model reachable for analysis.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// True when text arrives incrementally.
    fn streams(&self) -> bool;

    /// Sends a conversation and returns the assistant reply.
    ///
    /// Streamed fragments are forwarded to `fragments` as they arrive.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        fragments: Option<mpsc::Sender<String>>,
        cancel: &CancellationToken,
    ) -> Result<Completion, ProviderError>;

    /// Analyses one case text.
    ///
    /// Quota and blank or unreadable content yield a result; transport
    /// failures are returned as errors.
    async fn invoke(
        &self,
        case_text: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, ProviderError> {
        if case_text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }
        let provider = self.provider();
        let messages = [ChatMessage::user(case_text)];
        match self.complete(&messages, None, cancel).await {
            Ok(Completion::Text(text)) => {
                Ok(AnalysisResult::new(provider, AnalysisOutcome::Success(text)))
            }
            Ok(Completion::Quota(notice)) => Ok(AnalysisResult::new(
                provider,
                AnalysisOutcome::QuotaExceeded(notice.summary()),
            )),
            Err(err) if !err.is_transport() => Ok(AnalysisResult::failure(provider, &err)),
            Err(err) => Err(err),
        }
    }
}

/// Adapter speaking a provider's public HTTP API.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    provider: Provider,
    settings: ProviderSettings,
    client: reqwest::Client,
    system_prompt: Arc<str>,
    temperature: f32,
}

impl HttpProvider {
    pub fn new(provider: Provider, settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self {
            provider,
            settings,
            client,
            system_prompt: Arc::from(ANALYST_SYSTEM_PROMPT),
            temperature: providers::default_temperature(provider),
        }
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Arc::from(prompt);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        fragments: Option<mpsc::Sender<String>>,
    ) -> Result<Completion, ProviderError> {
        let provider = self.provider;
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingApiKey(provider))?;

        let request = providers::build_request(
            provider,
            &self.client,
            &providers::RequestParts {
                settings: &self.settings,
                api_key,
                system_prompt: &self.system_prompt,
                temperature: self.temperature,
                messages,
            },
        );
        tracing::debug!(%provider, model = %self.settings.model, "sending provider request");

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e))?;
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%provider, "provider quota exhausted");
            return Ok(Completion::Quota(providers::quota_notice(provider, &body)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%provider, status = status.as_u16(), "provider returned an error status");
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16(),
                body,
            });
        }

        let text = match providers::response_mode(provider) {
            ResponseMode::WholeBody { text_pointer } => {
                let body = resp
                    .text()
                    .await
                    .map_err(|e| ProviderError::from_reqwest(provider, e))?;
                extract_text(provider, &body, text_pointer)?
            }
            ResponseMode::Chunked(decoder) => {
                read_stream(provider, resp, decoder, fragments.as_ref()).await?
            }
        };
        tracing::info!(%provider, status = status.as_u16(), chars = text.chars().count(), "provider answered");
        Ok(Completion::Text(text))
    }
}

#[async_trait]
impl ProviderAdapter for HttpProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn streams(&self) -> bool {
        matches!(
            providers::response_mode(self.provider),
            ResponseMode::Chunked(_)
        )
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        fragments: Option<mpsc::Sender<String>>,
        cancel: &CancellationToken,
    ) -> Result<Completion, ProviderError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled(self.provider)),
            res = self.call(messages, fragments) => res,
        }
    }
}

/// Pulls the reply text out of a whole JSON body.
pub(crate) fn extract_text(
    provider: Provider,
    body: &str,
    pointer: &str,
) -> Result<String, ProviderError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ProviderError::InvalidBody {
        provider,
        message: e.to_string(),
    })?;
    match value.pointer(pointer).and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ProviderError::EmptyContent(provider)),
    }
}

async fn read_stream(
    provider: Provider,
    resp: reqwest::Response,
    decoder: StreamDecoder,
    sink: Option<&mpsc::Sender<String>>,
) -> Result<String, ProviderError> {
    let mut acc = StreamAccumulator::new(decoder);
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ProviderError::from_reqwest(provider, e))?;
        forward(sink, acc.feed(&chunk)).await;
        if acc.is_done() {
            break;
        }
    }
    forward(sink, acc.finish()).await;

    let text = acc.into_text();
    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyContent(provider));
    }
    Ok(text.to_string())
}

async fn forward(sink: Option<&mpsc::Sender<String>>, fragments: Vec<String>) {
    let Some(tx) = sink else { return };
    for fragment in fragments {
        // A dropped receiver only stops forwarding; the text is still collected.
        if tx.send(fragment).await.is_err() {
            return;
        }
    }
}
