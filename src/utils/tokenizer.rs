use once_cell::sync::Lazy;
use serde_json::Value;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

static TOKENIZER: Lazy<Option<CoreBPE>> = Lazy::new(|| match cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!("failed to initialize tokenizer, falling back to estimates: {e}");
        None
    }
});

/// Counts tokens in a text with cl100k, or roughly one token per four bytes
/// when the encoder is unavailable.
pub fn count_text_tokens(text: &str) -> i32 {
    if text.is_empty() {
        return 0;
    }
    match &*TOKENIZER {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as i32,
        None => (text.len() as i32 / 4).max(1),
    }
}

/// Estimates prompt tokens for an inbound request body before any upstream is
/// consulted. Counts every textual fragment the three dialects carry plus a
/// small per-message framing overhead.
pub fn estimate_prompt_tokens(body: &Value) -> i32 {
    let mut tokens = 0;

    // OpenAI chat / Claude: messages[].content (string or parts).
    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        for message in messages {
            tokens += 4;
            tokens += count_content_value(message.get("content"));
        }
    }
    // OpenAI responses: input may be a bare string or an item list.
    if let Some(input) = body.get("input") {
        match input {
            Value::String(text) => tokens += count_text_tokens(text),
            Value::Array(items) => {
                for item in items {
                    tokens += 4;
                    tokens += count_content_value(item.get("content"));
                }
            }
            _ => {}
        }
    }
    // Gemini: contents[].parts[].text.
    if let Some(contents) = body.get("contents").and_then(Value::as_array) {
        for content in contents {
            tokens += 4;
            if let Some(parts) = content.get("parts").and_then(Value::as_array) {
                for part in parts {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        tokens += count_text_tokens(text);
                    }
                }
            }
        }
    }
    // System prompts outside the message list (Claude `system`, Gemini
    // `system_instruction`).
    if let Some(system) = body.get("system") {
        tokens += count_content_value(Some(system));
    }
    if let Some(parts) = body
        .get("system_instruction")
        .and_then(|s| s.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                tokens += count_text_tokens(text);
            }
        }
    }

    tokens
}

fn count_content_value(content: Option<&Value>) -> i32 {
    match content {
        Some(Value::String(text)) => count_text_tokens(text),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .map(count_text_tokens)
                    .unwrap_or(0)
            })
            .sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_plain_text() {
        assert_eq!(count_text_tokens(""), 0);
        assert!(count_text_tokens("hello world") > 0);
    }

    #[test]
    fn estimates_openai_chat_prompt() {
        let body = json!({
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Explain tides."}
            ]
        });
        assert!(estimate_prompt_tokens(&body) > 8);
    }

    #[test]
    fn estimates_claude_prompt_with_parts_and_system() {
        let body = json!({
            "system": "Be brief.",
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "Hi there"}]}
            ]
        });
        assert!(estimate_prompt_tokens(&body) > 4);
    }

    #[test]
    fn estimates_gemini_prompt() {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": "Ping"}]}]
        });
        assert!(estimate_prompt_tokens(&body) >= 5);
    }

    #[test]
    fn empty_body_estimates_zero() {
        assert_eq!(estimate_prompt_tokens(&json!({})), 0);
    }
}
