use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::openai::flatten_content;
use super::unified::*;

/// The OpenAI responses dialect. Requests lower into the unified shape like
/// any other dialect; replies are only ever raised *into* this shape (a
/// responses-native upstream is always reached through the OpenAI adapter's
/// pass-through, so the reverse conversion has no caller).

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponsesRequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl From<ResponsesRequestPayload> for UnifiedRequest {
    fn from(payload: ResponsesRequestPayload) -> Self {
        let mut messages = Vec::new();
        if let Some(instructions) = &payload.instructions {
            if !instructions.is_empty() {
                messages.push(UnifiedMessage {
                    role: UnifiedRole::System,
                    content: UnifiedContent::Text(instructions.clone()),
                });
            }
        }
        match &payload.input {
            Some(Value::String(text)) => messages.push(UnifiedMessage {
                role: UnifiedRole::User,
                content: UnifiedContent::Text(text.clone()),
            }),
            Some(Value::Array(items)) => {
                for item in items {
                    let role = match item.get("role").and_then(Value::as_str) {
                        Some("assistant") => UnifiedRole::Assistant,
                        Some("system") | Some("developer") => UnifiedRole::System,
                        _ => UnifiedRole::User,
                    };
                    let text = item.get("content").map(flatten_content).unwrap_or_default();
                    messages.push(UnifiedMessage {
                        role,
                        content: UnifiedContent::Text(text),
                    });
                }
            }
            _ => {}
        }
        UnifiedRequest {
            model: payload.model,
            messages,
            tools: None,
            stream: payload.stream,
            temperature: payload.temperature,
            max_tokens: payload.max_output_tokens,
            top_p: payload.top_p,
            top_k: None,
            stop: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub object: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    pub status: String,
    pub model: String,
    pub output: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponsesUsage>,
}

impl From<UnifiedResponse> for ResponsesResponse {
    fn from(response: UnifiedResponse) -> Self {
        let output = response
            .choices
            .iter()
            .map(|choice| {
                let content = match &choice.message.content {
                    UnifiedContent::Text(text) => serde_json::json!([{
                        "type": "output_text",
                        "text": text,
                        "annotations": [],
                    }]),
                    UnifiedContent::ToolCalls(calls) => serde_json::json!(calls
                        .iter()
                        .map(|call| serde_json::json!({
                            "type": "tool_call",
                            "id": call.id,
                            "name": call.name,
                            "arguments": call.arguments,
                        }))
                        .collect::<Vec<_>>()),
                    UnifiedContent::ToolResult(result) => serde_json::json!([{
                        "type": "output_text",
                        "text": result.content,
                        "annotations": [],
                    }]),
                };
                serde_json::json!({
                    "type": "message",
                    "id": format!("msg_{}", response.id),
                    "status": "completed",
                    "role": "assistant",
                    "content": content,
                })
            })
            .collect();
        ResponsesResponse {
            id: response.id,
            object: "response".to_string(),
            created_at: response.created,
            status: "completed".to_string(),
            model: response.model,
            output,
            usage: response.usage.map(|usage| ResponsesUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        }
    }
}
