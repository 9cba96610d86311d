use async_trait::async_trait;
use markpanel_core::model::{AnalysisResult, ChatMessage, Provider};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::prompts::{format_reports, SUPERVISOR_SYSTEM_PROMPT};
use crate::provider::{Completion, HttpProvider, ProviderAdapter, ProviderSettings};

/// Merges per-provider results into one final opinion.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, results: &[AnalysisResult]) -> Result<String, ProviderError>;
}

/// Supervising OpenAI model reviewing all four reports.
#[derive(Debug, Clone)]
pub struct SupervisorSynthesizer {
    inner: HttpProvider,
}

impl SupervisorSynthesizer {
    pub const TEMPERATURE: f32 = 0.1;

    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        let inner = HttpProvider::new(Provider::OpenAi, settings, client)
            .with_system_prompt(SUPERVISOR_SYSTEM_PROMPT)
            .with_temperature(Self::TEMPERATURE);
        Self { inner }
    }
}

#[async_trait]
impl Synthesizer for SupervisorSynthesizer {
    async fn synthesize(&self, results: &[AnalysisResult]) -> Result<String, ProviderError> {
        let prompt = format_reports(results);
        tracing::info!(reports = results.len(), "requesting final analysis");
        let never = CancellationToken::new();
        match self
            .inner
            .complete(&[ChatMessage::user(prompt)], None, &never)
            .await?
        {
            Completion::Text(text) => Ok(text),
            Completion::Quota(notice) => Err(ProviderError::Quota {
                provider: Provider::OpenAi,
                message: notice.details,
            }),
        }
    }
}
