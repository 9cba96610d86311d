//! Per-provider wire formats.
//!
//! Each submodule knows its endpoint, request body and where the reply text
//! lives. Everything else is shared in [`crate::provider::HttpProvider`].

use markpanel_core::model::{ChatMessage, Provider};

use crate::provider::{ProviderSettings, QuotaNotice, ResponseMode};

pub mod anthropic;
pub mod deepseek;
pub mod gemini;
pub mod openai;

/// Output budget requested from every provider.
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 4000;

/// Inputs shared by every request builder.
pub(crate) struct RequestParts<'a> {
    pub settings: &'a ProviderSettings,
    pub api_key: &'a str,
    pub system_prompt: &'a str,
    pub temperature: f32,
    pub messages: &'a [ChatMessage],
}

pub(crate) fn build_request(
    provider: Provider,
    client: &reqwest::Client,
    parts: &RequestParts<'_>,
) -> reqwest::RequestBuilder {
    match provider {
        Provider::Anthropic => anthropic::request(client, parts),
        Provider::DeepSeek => deepseek::request(client, parts),
        Provider::Gemini => gemini::request(client, parts),
        Provider::OpenAi => openai::request(client, parts),
    }
}

pub(crate) fn response_mode(provider: Provider) -> ResponseMode {
    match provider {
        Provider::Anthropic => anthropic::RESPONSE_MODE,
        Provider::DeepSeek => deepseek::RESPONSE_MODE,
        Provider::Gemini => gemini::RESPONSE_MODE,
        Provider::OpenAi => openai::RESPONSE_MODE,
    }
}

/// Public base URL and default model.
pub(crate) fn defaults(provider: Provider) -> (&'static str, &'static str) {
    match provider {
        Provider::Anthropic => (anthropic::DEFAULT_BASE_URL, anthropic::DEFAULT_MODEL),
        Provider::DeepSeek => (deepseek::DEFAULT_BASE_URL, deepseek::DEFAULT_MODEL),
        Provider::Gemini => (gemini::DEFAULT_BASE_URL, gemini::DEFAULT_MODEL),
        Provider::OpenAi => (openai::DEFAULT_BASE_URL, openai::DEFAULT_MODEL),
    }
}

pub(crate) fn default_temperature(provider: Provider) -> f32 {
    match provider {
        Provider::DeepSeek => 0.1,
        _ => 0.2,
    }
}

/// Quota explanation built from a 429 body.
pub(crate) fn quota_notice(provider: Provider, body: &str) -> QuotaNotice {
    match provider {
        Provider::Gemini => gemini::quota_notice(body),
        _ => QuotaNotice {
            error: format!("{} API Quota erreicht", vendor_name(provider)),
            details: format!(
                "Das Kontingent für {} wurde überschritten. Bitte versuchen Sie es später erneut.",
                vendor_name(provider)
            ),
            fallback: "Die Analyse wird mit den anderen Modellen fortgesetzt.".to_string(),
        },
    }
}

/// Company name as used in quota messages.
fn vendor_name(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "Anthropic",
        Provider::DeepSeek => "DeepSeek",
        Provider::Gemini => "Gemini",
        Provider::OpenAi => "OpenAI",
    }
}
