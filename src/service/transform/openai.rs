use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::unified::*;

// --- wire shapes ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// OpenAI carries arguments as a JSON-encoded string.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiToolDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiRequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChoice {
    pub index: u32,
    pub message: OpenAiMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiResponse {
    pub id: String,
    pub object: String,
    pub created: Option<i64>,
    pub model: String,
    pub choices: Vec<OpenAiChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChunkChoice {
    pub index: u32,
    pub delta: OpenAiDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChunkResponse {
    pub id: String,
    pub object: String,
    pub created: Option<i64>,
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAiChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
}

// --- finish reason spellings ---

pub fn finish_reason_from_openai(reason: &str) -> Option<UnifiedFinishReason> {
    match reason {
        "stop" => Some(UnifiedFinishReason::Stop),
        "length" => Some(UnifiedFinishReason::Length),
        "tool_calls" | "function_call" => Some(UnifiedFinishReason::ToolCalls),
        "content_filter" => Some(UnifiedFinishReason::ContentFilter),
        _ => Some(UnifiedFinishReason::Stop),
    }
}

pub fn finish_reason_to_openai(reason: UnifiedFinishReason) -> &'static str {
    match reason {
        UnifiedFinishReason::Stop => "stop",
        UnifiedFinishReason::Length => "length",
        UnifiedFinishReason::ToolCalls => "tool_calls",
        UnifiedFinishReason::ContentFilter => "content_filter",
    }
}

// --- content helpers ---

/// Flattens an OpenAI content value (string or text-part array) to plain text.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn tool_call_to_unified(call: &OpenAiToolCall) -> UnifiedToolCall {
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or_else(|_| Value::String(call.function.arguments.clone()));
    UnifiedToolCall {
        id: call.id.clone().unwrap_or_default(),
        name: call.function.name.clone(),
        arguments,
    }
}

fn tool_call_from_unified(call: &UnifiedToolCall, index: Option<u32>) -> OpenAiToolCall {
    OpenAiToolCall {
        index,
        id: Some(call.id.clone()),
        call_type: Some("function".to_string()),
        function: OpenAiFunctionCall {
            name: call.name.clone(),
            arguments: serde_json::to_string(&call.arguments).unwrap_or_default(),
        },
    }
}

// --- request conversions ---

impl From<OpenAiRequestPayload> for UnifiedRequest {
    fn from(payload: OpenAiRequestPayload) -> Self {
        let messages = payload
            .messages
            .iter()
            .map(|message| {
                let role = match message.role.as_str() {
                    "system" | "developer" => UnifiedRole::System,
                    "assistant" => UnifiedRole::Assistant,
                    "tool" => UnifiedRole::Tool,
                    _ => UnifiedRole::User,
                };
                let content = if let Some(calls) = &message.tool_calls {
                    UnifiedContent::ToolCalls(calls.iter().map(tool_call_to_unified).collect())
                } else if role == UnifiedRole::Tool {
                    UnifiedContent::ToolResult(UnifiedToolResult {
                        tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                        name: message.name.clone().unwrap_or_default(),
                        content: message
                            .content
                            .as_ref()
                            .map(flatten_content)
                            .unwrap_or_default(),
                    })
                } else {
                    UnifiedContent::Text(
                        message
                            .content
                            .as_ref()
                            .map(flatten_content)
                            .unwrap_or_default(),
                    )
                };
                UnifiedMessage { role, content }
            })
            .collect();

        let stop = payload.stop.as_ref().map(|stop| match stop {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect(),
            _ => Vec::new(),
        });

        let tools = payload.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| UnifiedFunction {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                })
                .collect()
        });

        UnifiedRequest {
            model: payload.model,
            messages,
            tools,
            stream: payload.stream,
            temperature: payload.temperature,
            max_tokens: payload.max_tokens,
            top_p: payload.top_p,
            top_k: None,
            stop,
        }
    }
}

impl From<UnifiedRequest> for OpenAiRequestPayload {
    fn from(request: UnifiedRequest) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|message| match (&message.role, &message.content) {
                (role, UnifiedContent::Text(text)) => OpenAiMessage {
                    role: match role {
                        UnifiedRole::System => "system",
                        UnifiedRole::Assistant => "assistant",
                        UnifiedRole::Tool => "tool",
                        UnifiedRole::User => "user",
                    }
                    .to_string(),
                    content: Some(Value::String(text.clone())),
                    tool_calls: None,
                    tool_call_id: None,
                    name: None,
                },
                (_, UnifiedContent::ToolCalls(calls)) => OpenAiMessage {
                    role: "assistant".to_string(),
                    content: Some(Value::Null),
                    tool_calls: Some(
                        calls
                            .iter()
                            .map(|call| tool_call_from_unified(call, None))
                            .collect(),
                    ),
                    tool_call_id: None,
                    name: None,
                },
                (_, UnifiedContent::ToolResult(result)) => OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(Value::String(result.content.clone())),
                    tool_calls: None,
                    tool_call_id: Some(result.tool_call_id.clone()),
                    name: Some(result.name.clone()),
                },
            })
            .collect();

        let stop = request.stop.as_ref().map(|stop| {
            if stop.len() == 1 {
                Value::String(stop[0].clone())
            } else {
                json!(stop)
            }
        });

        let tools = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    tool_type: "function".to_string(),
                    function: OpenAiToolDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect()
        });

        OpenAiRequestPayload {
            model: request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop,
            tools,
            stream: request.stream,
            stream_options: None,
        }
    }
}

// --- response conversions ---

impl From<OpenAiResponse> for UnifiedResponse {
    fn from(response: OpenAiResponse) -> Self {
        let choices = response
            .choices
            .iter()
            .map(|choice| {
                let content = if let Some(calls) = &choice.message.tool_calls {
                    UnifiedContent::ToolCalls(calls.iter().map(tool_call_to_unified).collect())
                } else {
                    UnifiedContent::Text(
                        choice
                            .message
                            .content
                            .as_ref()
                            .map(flatten_content)
                            .unwrap_or_default(),
                    )
                };
                UnifiedChoice {
                    index: choice.index,
                    message: UnifiedMessage {
                        role: UnifiedRole::Assistant,
                        content,
                    },
                    finish_reason: choice
                        .finish_reason
                        .as_deref()
                        .and_then(finish_reason_from_openai),
                }
            })
            .collect();
        UnifiedResponse {
            id: response.id,
            model: response.model,
            choices,
            usage: response.usage.map(|usage| UnifiedUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
            created: response.created,
        }
    }
}

impl From<UnifiedResponse> for OpenAiResponse {
    fn from(response: UnifiedResponse) -> Self {
        let choices = response
            .choices
            .iter()
            .map(|choice| {
                let (content, tool_calls) = match &choice.message.content {
                    UnifiedContent::Text(text) => (Some(Value::String(text.clone())), None),
                    UnifiedContent::ToolCalls(calls) => (
                        Some(Value::Null),
                        Some(
                            calls
                                .iter()
                                .map(|call| tool_call_from_unified(call, None))
                                .collect(),
                        ),
                    ),
                    UnifiedContent::ToolResult(result) => {
                        (Some(Value::String(result.content.clone())), None)
                    }
                };
                OpenAiChoice {
                    index: choice.index,
                    message: OpenAiMessage {
                        role: "assistant".to_string(),
                        content,
                        tool_calls,
                        tool_call_id: None,
                        name: None,
                    },
                    finish_reason: choice.finish_reason.map(|r| {
                        finish_reason_to_openai(r).to_string()
                    }),
                }
            })
            .collect();
        OpenAiResponse {
            id: response.id,
            object: "chat.completion".to_string(),
            created: response.created,
            model: response.model,
            choices,
            usage: response.usage.map(|usage| OpenAiUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        }
    }
}

// --- chunk conversions ---

impl From<OpenAiChunkResponse> for UnifiedChunkResponse {
    fn from(chunk: OpenAiChunkResponse) -> Self {
        let choices = chunk
            .choices
            .iter()
            .map(|choice| UnifiedChunkChoice {
                index: choice.index,
                delta: UnifiedDelta {
                    role: choice.delta.role.as_deref().map(|role| match role {
                        "assistant" => UnifiedRole::Assistant,
                        "system" => UnifiedRole::System,
                        "tool" => UnifiedRole::Tool,
                        _ => UnifiedRole::User,
                    }),
                    content: choice.delta.content.clone(),
                    tool_calls: choice
                        .delta
                        .tool_calls
                        .as_ref()
                        .map(|calls| calls.iter().map(tool_call_to_unified).collect()),
                },
                finish_reason: choice
                    .finish_reason
                    .as_deref()
                    .and_then(finish_reason_from_openai),
            })
            .collect();
        UnifiedChunkResponse {
            id: chunk.id,
            model: chunk.model,
            choices,
            usage: chunk.usage.map(|usage| UnifiedUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
            created: chunk.created,
        }
    }
}

impl From<UnifiedChunkResponse> for OpenAiChunkResponse {
    fn from(chunk: UnifiedChunkResponse) -> Self {
        let choices = chunk
            .choices
            .iter()
            .map(|choice| OpenAiChunkChoice {
                index: choice.index,
                delta: OpenAiDelta {
                    role: choice.delta.role.map(|role| {
                        match role {
                            UnifiedRole::Assistant => "assistant",
                            UnifiedRole::System => "system",
                            UnifiedRole::Tool => "tool",
                            UnifiedRole::User => "user",
                        }
                        .to_string()
                    }),
                    content: choice.delta.content.clone(),
                    tool_calls: choice.delta.tool_calls.as_ref().map(|calls| {
                        calls
                            .iter()
                            .enumerate()
                            .map(|(i, call)| tool_call_from_unified(call, Some(i as u32)))
                            .collect()
                    }),
                },
                finish_reason: choice
                    .finish_reason
                    .map(|r| finish_reason_to_openai(r).to_string()),
            })
            .collect();
        OpenAiChunkResponse {
            id: chunk.id,
            object: "chat.completion.chunk".to_string(),
            created: chunk.created,
            model: chunk.model,
            choices,
            usage: chunk.usage.map(|usage| OpenAiUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        }
    }
}
