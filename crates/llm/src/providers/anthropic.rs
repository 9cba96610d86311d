//! Anthropic Messages API, streamed.

use markpanel_core::model::ChatRole;
use serde::Serialize;

use super::{RequestParts, MAX_OUTPUT_TOKENS};
use crate::provider::ResponseMode;
use crate::stream::StreamDecoder;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) const RESPONSE_MODE: ResponseMode =
    ResponseMode::Chunked(StreamDecoder::ANTHROPIC_MESSAGES);

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

pub(crate) fn request(client: &reqwest::Client, parts: &RequestParts<'_>) -> reqwest::RequestBuilder {
    let body = MessagesRequest {
        model: &parts.settings.model,
        max_tokens: MAX_OUTPUT_TOKENS,
        temperature: parts.temperature,
        system: parts.system_prompt,
        messages: parts
            .messages
            .iter()
            .map(|m| Message {
                role: match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect(),
        stream: true,
    };
    client
        .post(format!("{}/v1/messages", parts.settings.base_url))
        .header("x-api-key", parts.api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
}
