//! OpenAI chat completions, one JSON body.

use markpanel_core::model::{ChatMessage, ChatRole};
use serde::Serialize;

use super::{RequestParts, MAX_OUTPUT_TOKENS};
use crate::provider::ResponseMode;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub(crate) const RESPONSE_MODE: ResponseMode = ResponseMode::WholeBody {
    text_pointer: "/choices/0/message/content",
};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageBody<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// Message in the chat-completions shape, shared with DeepSeek.
#[derive(Debug, Serialize)]
pub(crate) struct ChatMessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

/// System prompt first, then the conversation.
pub(crate) fn chat_messages<'a>(
    system_prompt: &'a str,
    messages: &'a [ChatMessage],
) -> Vec<ChatMessageBody<'a>> {
    std::iter::once(ChatMessageBody {
        role: "system",
        content: system_prompt,
    })
    .chain(messages.iter().map(|m| ChatMessageBody {
        role: match m.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        },
        content: &m.content,
    }))
    .collect()
}

pub(crate) fn request(client: &reqwest::Client, parts: &RequestParts<'_>) -> reqwest::RequestBuilder {
    let body = ChatRequest {
        model: &parts.settings.model,
        messages: chat_messages(parts.system_prompt, parts.messages),
        temperature: parts.temperature,
        max_tokens: MAX_OUTPUT_TOKENS,
    };
    client
        .post(format!("{}/v1/chat/completions", parts.settings.base_url))
        .bearer_auth(parts.api_key)
        .json(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_leads_the_conversation() {
        let msgs = vec![
            ChatMessage::user("Frage"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: "Antwort".into(),
            },
        ];
        let body = serde_json::to_value(chat_messages("SYS", &msgs)).unwrap();
        assert_eq!(
            body,
            serde_json::json!([
                {"role": "system", "content": "SYS"},
                {"role": "user", "content": "Frage"},
                {"role": "assistant", "content": "Antwort"},
            ])
        );
    }
}
