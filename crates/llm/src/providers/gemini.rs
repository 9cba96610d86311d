//! Google Gemini `generateContent`, one JSON body.
//!
//! The API has no system role here, so the instructions travel as a first
//! user turn followed by a canned model acknowledgement.

use markpanel_core::model::ChatRole;
use serde::Serialize;
use serde_json::Value;

use super::{RequestParts, MAX_OUTPUT_TOKENS};
use crate::prompts::SYSTEM_ACK;
use crate::provider::{QuotaNotice, ResponseMode};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub(crate) const RESPONSE_MODE: ResponseMode = ResponseMode::WholeBody {
    text_pointer: "/candidates/0/content/parts/0/text",
};

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

fn content<'a>(role: &'static str, text: &'a str) -> Content<'a> {
    Content {
        role,
        parts: [Part { text }],
    }
}

pub(crate) fn request(client: &reqwest::Client, parts: &RequestParts<'_>) -> reqwest::RequestBuilder {
    let mut contents = vec![
        content("user", parts.system_prompt),
        content("model", SYSTEM_ACK),
    ];
    contents.extend(parts.messages.iter().map(|m| {
        let role = match m.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        };
        content(role, &m.content)
    }));

    let body = GenerateRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: parts.temperature,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            top_p: 0.8,
            top_k: 40,
        },
        safety_settings: SAFETY_CATEGORIES
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_MEDIUM_AND_ABOVE",
            })
            .collect(),
    };
    client
        .post(format!(
            "{}/v1beta/models/{}:generateContent",
            parts.settings.base_url, parts.settings.model
        ))
        .query(&[("key", parts.api_key)])
        .json(&body)
}

/// Quota notice including the suggested retry delay when the body has one.
pub(crate) fn quota_notice(body: &str) -> QuotaNotice {
    let retry = retry_delay(body);
    let hint = match retry {
        Some(delay) => format!("Versuchen Sie es in {delay} erneut."),
        None => "Bitte versuchen Sie es später erneut.".to_string(),
    };
    QuotaNotice {
        error: "Gemini API Quota erreicht".to_string(),
        details: format!("Das kostenlose Kontingent für Gemini wurde überschritten. {hint}"),
        fallback: "Die Analyse wird mit Claude und DeepSeek fortgesetzt.".to_string(),
    }
}

fn retry_delay(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/details")?
        .as_array()?
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.contains("RetryInfo"))
        })
        .find_map(|d| d.get("retryDelay").and_then(Value::as_str))
        .map(str::to_string)
}
