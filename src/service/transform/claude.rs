use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::unified::*;

// --- wire shapes ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClaudeRequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeToolDefinition>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClaudeUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub content: Vec<ClaudeContentBlock>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

/// One event of a Claude message stream, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: Value },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: u32, content_block: Value },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: Value },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: u32 },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: Value,
        #[serde(default)]
        usage: Option<Value>,
    },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(rename = "ping")]
    Ping {},
}

// --- stop reason spellings ---

pub fn finish_reason_from_claude(reason: &str) -> Option<UnifiedFinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(UnifiedFinishReason::Stop),
        "max_tokens" => Some(UnifiedFinishReason::Length),
        "tool_use" => Some(UnifiedFinishReason::ToolCalls),
        "refusal" => Some(UnifiedFinishReason::ContentFilter),
        _ => Some(UnifiedFinishReason::Stop),
    }
}

pub fn finish_reason_to_claude(reason: UnifiedFinishReason) -> &'static str {
    match reason {
        UnifiedFinishReason::Stop => "end_turn",
        UnifiedFinishReason::Length => "max_tokens",
        UnifiedFinishReason::ToolCalls => "tool_use",
        UnifiedFinishReason::ContentFilter => "refusal",
    }
}

fn flatten_claude_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

// --- request conversions ---

impl From<ClaudeRequestPayload> for UnifiedRequest {
    fn from(payload: ClaudeRequestPayload) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = &payload.system {
            let text = flatten_claude_content(system);
            if !text.is_empty() {
                messages.push(UnifiedMessage {
                    role: UnifiedRole::System,
                    content: UnifiedContent::Text(text),
                });
            }
        }
        for message in &payload.messages {
            let role = if message.role == "assistant" {
                UnifiedRole::Assistant
            } else {
                UnifiedRole::User
            };
            match &message.content {
                Value::Array(blocks) => {
                    // A block list may interleave text, tool calls and tool
                    // results; each kind becomes its own unified message.
                    let mut text = String::new();
                    let mut tool_calls = Vec::new();
                    let mut tool_results = Vec::new();
                    for block in blocks {
                        match block.get("type").and_then(Value::as_str) {
                            Some("text") => {
                                if let Some(t) = block.get("text").and_then(Value::as_str) {
                                    text.push_str(t);
                                }
                            }
                            Some("tool_use") => tool_calls.push(UnifiedToolCall {
                                id: block
                                    .get("id")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                name: block
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                arguments: block.get("input").cloned().unwrap_or(Value::Null),
                            }),
                            Some("tool_result") => tool_results.push(UnifiedToolResult {
                                tool_call_id: block
                                    .get("tool_use_id")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                name: String::new(),
                                content: block
                                    .get("content")
                                    .map(flatten_claude_content)
                                    .unwrap_or_default(),
                            }),
                            _ => {}
                        }
                    }
                    if !text.is_empty() {
                        messages.push(UnifiedMessage {
                            role,
                            content: UnifiedContent::Text(text),
                        });
                    }
                    if !tool_calls.is_empty() {
                        messages.push(UnifiedMessage {
                            role: UnifiedRole::Assistant,
                            content: UnifiedContent::ToolCalls(tool_calls),
                        });
                    }
                    for result in tool_results {
                        messages.push(UnifiedMessage {
                            role: UnifiedRole::Tool,
                            content: UnifiedContent::ToolResult(result),
                        });
                    }
                }
                content => messages.push(UnifiedMessage {
                    role,
                    content: UnifiedContent::Text(flatten_claude_content(content)),
                }),
            }
        }

        let tools = payload.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| UnifiedFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                })
                .collect()
        });

        UnifiedRequest {
            model: payload.model,
            messages,
            tools,
            stream: payload.stream,
            temperature: payload.temperature,
            max_tokens: Some(payload.max_tokens),
            top_p: payload.top_p,
            top_k: payload.top_k,
            stop: payload.stop_sequences,
        }
    }
}

impl From<UnifiedRequest> for ClaudeRequestPayload {
    fn from(request: UnifiedRequest) -> Self {
        let (system, rest) = request.split_system_prompt();
        let mut messages = Vec::new();
        for message in rest {
            match &message.content {
                UnifiedContent::Text(text) => messages.push(ClaudeMessage {
                    role: if message.role == UnifiedRole::Assistant {
                        "assistant".to_string()
                    } else {
                        "user".to_string()
                    },
                    content: Value::String(text.clone()),
                }),
                UnifiedContent::ToolCalls(calls) => {
                    let blocks: Vec<Value> = calls
                        .iter()
                        .map(|call| {
                            json!({
                                "type": "tool_use",
                                "id": call.id,
                                "name": call.name,
                                "input": call.arguments,
                            })
                        })
                        .collect();
                    messages.push(ClaudeMessage {
                        role: "assistant".to_string(),
                        content: Value::Array(blocks),
                    });
                }
                UnifiedContent::ToolResult(result) => messages.push(ClaudeMessage {
                    role: "user".to_string(),
                    content: json!([{
                        "type": "tool_result",
                        "tool_use_id": result.tool_call_id,
                        "content": result.content,
                    }]),
                }),
            }
        }

        let tools = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|tool| ClaudeToolDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.parameters.clone(),
                })
                .collect()
        });

        ClaudeRequestPayload {
            model: request.model,
            // The messages API requires max_tokens; pick a workable ceiling
            // when the inbound dialect left it unset.
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: system.map(Value::String),
            messages,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            stop_sequences: request.stop,
            tools,
            stream: request.stream,
        }
    }
}

// --- response conversions ---

impl From<ClaudeResponse> for UnifiedResponse {
    fn from(response: ClaudeResponse) -> Self {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &response.content {
            match block {
                ClaudeContentBlock::Text { text: t } => text.push_str(t),
                ClaudeContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(UnifiedToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.clone(),
                    })
                }
                ClaudeContentBlock::ToolResult { .. } => {}
            }
        }
        let content = if !tool_calls.is_empty() {
            UnifiedContent::ToolCalls(tool_calls)
        } else {
            UnifiedContent::Text(text)
        };
        UnifiedResponse {
            id: response.id,
            model: response.model,
            choices: vec![UnifiedChoice {
                index: 0,
                message: UnifiedMessage {
                    role: UnifiedRole::Assistant,
                    content,
                },
                finish_reason: response
                    .stop_reason
                    .as_deref()
                    .and_then(finish_reason_from_claude),
            }],
            usage: Some(UnifiedUsage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
                total_tokens: response.usage.input_tokens + response.usage.output_tokens,
            }),
            created: None,
        }
    }
}

impl From<UnifiedResponse> for ClaudeResponse {
    fn from(response: UnifiedResponse) -> Self {
        let choice = response.choices.first();
        let mut content = Vec::new();
        let mut stop_reason = None;
        if let Some(choice) = choice {
            stop_reason = choice
                .finish_reason
                .map(|reason| finish_reason_to_claude(reason).to_string());
            match &choice.message.content {
                UnifiedContent::Text(text) => {
                    if !text.is_empty() {
                        content.push(ClaudeContentBlock::Text { text: text.clone() });
                    }
                }
                UnifiedContent::ToolCalls(calls) => {
                    for call in calls {
                        content.push(ClaudeContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        });
                    }
                }
                UnifiedContent::ToolResult(result) => {
                    content.push(ClaudeContentBlock::Text {
                        text: result.content.clone(),
                    });
                }
            }
        }
        let usage = response.usage.unwrap_or_default();
        ClaudeResponse {
            id: response.id,
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content,
            model: response.model,
            stop_reason,
            stop_sequence: None,
            usage: ClaudeUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        }
    }
}

// --- chunk conversions ---

/// Lowers one Claude stream event into the unified chunk shape. Events that
/// carry no forwardable payload (ping, content_block_stop, message_stop)
/// return None.
impl ClaudeEvent {
    pub fn into_unified_chunk(self) -> Option<UnifiedChunkResponse> {
        match self {
            ClaudeEvent::MessageStart { message } => {
                let id = message
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let model = message
                    .get("model")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(UnifiedChunkResponse {
                    id,
                    model,
                    choices: vec![UnifiedChunkChoice {
                        index: 0,
                        delta: UnifiedDelta {
                            role: Some(UnifiedRole::Assistant),
                            ..Default::default()
                        },
                        finish_reason: None,
                    }],
                    usage: None,
                    created: None,
                })
            }
            ClaudeEvent::ContentBlockStart { content_block, .. } => {
                // Only tool_use starts carry payload worth forwarding.
                let name = content_block.get("name").and_then(Value::as_str)?;
                Some(UnifiedChunkResponse {
                    choices: vec![UnifiedChunkChoice {
                        index: 0,
                        delta: UnifiedDelta {
                            tool_calls: Some(vec![UnifiedToolCall {
                                id: content_block
                                    .get("id")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string(),
                                name: name.to_string(),
                                arguments: json!({}),
                            }]),
                            ..Default::default()
                        },
                        finish_reason: None,
                    }],
                    ..Default::default()
                })
            }
            ClaudeEvent::ContentBlockDelta { delta, .. } => {
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = delta.get("text").and_then(Value::as_str)?;
                        Some(UnifiedChunkResponse {
                            choices: vec![UnifiedChunkChoice {
                                index: 0,
                                delta: UnifiedDelta {
                                    content: Some(text.to_string()),
                                    ..Default::default()
                                },
                                finish_reason: None,
                            }],
                            ..Default::default()
                        })
                    }
                    Some("input_json_delta") => {
                        let fragment = delta.get("partial_json").and_then(Value::as_str)?;
                        Some(UnifiedChunkResponse {
                            choices: vec![UnifiedChunkChoice {
                                index: 0,
                                delta: UnifiedDelta {
                                    tool_calls: Some(vec![UnifiedToolCall {
                                        id: String::new(),
                                        name: String::new(),
                                        arguments: Value::String(fragment.to_string()),
                                    }]),
                                    ..Default::default()
                                },
                                finish_reason: None,
                            }],
                            ..Default::default()
                        })
                    }
                    _ => None,
                }
            }
            ClaudeEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta
                    .get("stop_reason")
                    .and_then(Value::as_str)
                    .and_then(finish_reason_from_claude);
                let usage = usage.as_ref().map(|usage| UnifiedUsage {
                    prompt_tokens: 0,
                    completion_tokens: usage
                        .get("output_tokens")
                        .and_then(Value::as_i64)
                        .unwrap_or(0),
                    total_tokens: 0,
                });
                Some(UnifiedChunkResponse {
                    choices: vec![UnifiedChunkChoice {
                        index: 0,
                        delta: UnifiedDelta::default(),
                        finish_reason,
                    }],
                    usage,
                    ..Default::default()
                })
            }
            ClaudeEvent::ContentBlockStop { .. }
            | ClaudeEvent::MessageStop {}
            | ClaudeEvent::Ping {} => None,
        }
    }
}
