//! DeepSeek chat completions, streamed.

use serde::Serialize;

use super::openai::{chat_messages, ChatMessageBody};
use super::{RequestParts, MAX_OUTPUT_TOKENS};
use crate::provider::ResponseMode;
use crate::stream::StreamDecoder;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

pub(crate) const RESPONSE_MODE: ResponseMode =
    ResponseMode::Chunked(StreamDecoder::CHAT_COMPLETIONS);

#[derive(Debug, Serialize)]
struct StreamingChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageBody<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

pub(crate) fn request(client: &reqwest::Client, parts: &RequestParts<'_>) -> reqwest::RequestBuilder {
    let body = StreamingChatRequest {
        model: &parts.settings.model,
        messages: chat_messages(parts.system_prompt, parts.messages),
        temperature: parts.temperature,
        max_tokens: MAX_OUTPUT_TOKENS,
        stream: true,
    };
    client
        .post(format!("{}/v1/chat/completions", parts.settings.base_url))
        .bearer_auth(parts.api_key)
        .json(&body)
}
