use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::unified::*;
use crate::utils::ID_GENERATOR;

// --- wire shapes ---

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

fn generation_config_is_empty(config: &GeminiGenerationConfig) -> bool {
    config.temperature.is_none()
        && config.max_output_tokens.is_none()
        && config.top_p.is_none()
        && config.top_k.is_none()
        && config.stop_sequences.is_none()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiRequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    pub contents: Vec<GeminiContent>,
    #[serde(
        rename = "generationConfig",
        default,
        skip_serializing_if = "generation_config_is_empty"
    )]
    pub generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: i64,
    #[serde(default)]
    pub candidates_token_count: i64,
    #[serde(default)]
    pub total_token_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// Gemini streams the same candidate shape per chunk; no separate chunk type.
pub type GeminiChunkResponse = GeminiResponse;

// --- finish reason spellings ---

pub fn finish_reason_from_gemini(reason: &str) -> Option<UnifiedFinishReason> {
    match reason {
        "STOP" => Some(UnifiedFinishReason::Stop),
        "MAX_TOKENS" => Some(UnifiedFinishReason::Length),
        "TOOL_USE" => Some(UnifiedFinishReason::ToolCalls),
        "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" => Some(UnifiedFinishReason::ContentFilter),
        _ => Some(UnifiedFinishReason::Stop),
    }
}

pub fn finish_reason_to_gemini(reason: UnifiedFinishReason) -> &'static str {
    match reason {
        UnifiedFinishReason::Stop => "STOP",
        UnifiedFinishReason::Length => "MAX_TOKENS",
        UnifiedFinishReason::ToolCalls => "TOOL_USE",
        UnifiedFinishReason::ContentFilter => "SAFETY",
    }
}

fn generate_call_id() -> String {
    format!("call_{}", ID_GENERATOR.generate_id())
}

// --- request conversions ---

impl From<GeminiRequestPayload> for UnifiedRequest {
    fn from(payload: GeminiRequestPayload) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = &payload.system_instruction {
            let text: String = system
                .parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if !text.is_empty() {
                messages.push(UnifiedMessage {
                    role: UnifiedRole::System,
                    content: UnifiedContent::Text(text),
                });
            }
        }
        for content in &payload.contents {
            let role = match content.role.as_deref() {
                Some("model") => UnifiedRole::Assistant,
                _ => UnifiedRole::User,
            };
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            let mut tool_results = Vec::new();
            for part in &content.parts {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                } else if let Some(call) = part.get("functionCall") {
                    tool_calls.push(UnifiedToolCall {
                        id: generate_call_id(),
                        name: call
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: call.get("args").cloned().unwrap_or(json!({})),
                    });
                } else if let Some(response) = part.get("functionResponse") {
                    let name = response
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let content = response
                        .get("response")
                        .map(|r| serde_json::to_string(r).unwrap_or_default())
                        .unwrap_or_default();
                    tool_results.push(UnifiedToolResult {
                        tool_call_id: String::new(),
                        name,
                        content,
                    });
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

        let tools = payload.tools.as_ref().map(|tools| {
            tools
                .iter()
                .flat_map(|tool| {
                    tool.get("functionDeclarations")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default()
                })
                .map(|declaration| UnifiedFunction {
                    name: declaration
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    description: declaration
                        .get("description")
                        .and_then(Value::as_str)
                        .map(|s| s.to_string()),
                    parameters: declaration.get("parameters").cloned().unwrap_or(json!({})),
                })
                .collect()
        });

        UnifiedRequest {
            model: None,
            messages,
            tools,
            stream: false,
            temperature: payload.generation_config.temperature,
            max_tokens: payload.generation_config.max_output_tokens,
            top_p: payload.generation_config.top_p,
            top_k: payload.generation_config.top_k,
            stop: payload.generation_config.stop_sequences,
        }
    }
}

impl From<UnifiedRequest> for GeminiRequestPayload {
    fn from(request: UnifiedRequest) -> Self {
        let (system, rest) = request.split_system_prompt();
        let mut contents: Vec<GeminiContent> = Vec::new();
        for message in rest {
            match &message.content {
                UnifiedContent::Text(text) => contents.push(GeminiContent {
                    role: Some(
                        if message.role == UnifiedRole::Assistant {
                            "model"
                        } else {
                            "user"
                        }
                        .to_string(),
                    ),
                    parts: vec![json!({"text": text})],
                }),
                UnifiedContent::ToolCalls(calls) => contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    parts: calls
                        .iter()
                        .map(|call| {
                            json!({
                                "functionCall": {
                                    "name": call.name,
                                    "args": normalize_arguments(&call.arguments),
                                }
                            })
                        })
                        .collect(),
                }),
                // Gemini expects function responses under the user role.
                UnifiedContent::ToolResult(result) => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![json!({
                        "functionResponse": {
                            "name": result.name,
                            "response": parse_tool_result_content(&result.content),
                        }
                    })],
                }),
            }
        }

        let tools = request.tools.as_ref().map(|tools| {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    let mut declaration = json!({
                        "name": tool.name,
                        "parameters": tool.parameters,
                    });
                    if let Some(description) = &tool.description {
                        declaration["description"] = json!(description);
                    }
                    declaration
                })
                .collect();
            vec![json!({"functionDeclarations": declarations})]
        });

        GeminiRequestPayload {
            system_instruction: system.map(|text| GeminiContent {
                role: None,
                parts: vec![json!({"text": text})],
            }),
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                top_p: request.top_p,
                top_k: request.top_k,
                stop_sequences: request.stop,
            },
            tools,
        }
    }
}

fn normalize_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or(json!({})),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

fn parse_tool_result_content(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| json!({ "result": content }))
}

// --- response conversions ---

impl From<GeminiResponse> for UnifiedResponse {
    fn from(response: GeminiResponse) -> Self {
        let choices = response
            .candidates
            .iter()
            .map(|candidate| {
                let (content, has_tool_call) = candidate_content(candidate);
                let finish_reason = candidate
                    .finish_reason
                    .as_deref()
                    .and_then(finish_reason_from_gemini)
                    .map(|reason| {
                        // A candidate that called a tool finished for the
                        // tool's sake regardless of the reported reason.
                        if has_tool_call {
                            UnifiedFinishReason::ToolCalls
                        } else {
                            reason
                        }
                    });
                UnifiedChoice {
                    index: candidate.index,
                    message: UnifiedMessage {
                        role: UnifiedRole::Assistant,
                        content,
                    },
                    finish_reason,
                }
            })
            .collect();
        UnifiedResponse {
            id: format!("chatcmpl-{}", ID_GENERATOR.generate_id()),
            model: response
                .model_version
                .unwrap_or_else(|| "gemini".to_string()),
            choices,
            usage: response.usage_metadata.map(|usage| UnifiedUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            }),
            created: None,
        }
    }
}

fn candidate_content(candidate: &GeminiCandidate) -> (UnifiedContent, bool) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    if let Some(content) = &candidate.content {
        for part in &content.parts {
            if let Some(t) = part.get("text").and_then(Value::as_str) {
                text.push_str(t);
            } else if let Some(call) = part.get("functionCall") {
                tool_calls.push(UnifiedToolCall {
                    id: generate_call_id(),
                    name: call
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    arguments: call.get("args").cloned().unwrap_or(json!({})),
                });
            }
        }
    }
    if !tool_calls.is_empty() {
        (UnifiedContent::ToolCalls(tool_calls), true)
    } else {
        (UnifiedContent::Text(text), false)
    }
}

impl From<UnifiedResponse> for GeminiResponse {
    fn from(response: UnifiedResponse) -> Self {
        let candidates = response
            .choices
            .iter()
            .map(|choice| {
                let parts = match &choice.message.content {
                    UnifiedContent::Text(text) => vec![json!({"text": text})],
                    UnifiedContent::ToolCalls(calls) => calls
                        .iter()
                        .map(|call| {
                            json!({
                                "functionCall": {
                                    "name": call.name,
                                    "args": normalize_arguments(&call.arguments),
                                }
                            })
                        })
                        .collect(),
                    UnifiedContent::ToolResult(result) => vec![json!({"text": result.content})],
                };
                GeminiCandidate {
                    index: choice.index,
                    content: Some(GeminiContent {
                        role: Some("model".to_string()),
                        parts,
                    }),
                    finish_reason: choice
                        .finish_reason
                        .map(|reason| finish_reason_to_gemini(reason).to_string()),
                }
            })
            .collect();
        GeminiResponse {
            candidates,
            usage_metadata: response.usage.map(|usage| GeminiUsageMetadata {
                prompt_token_count: usage.prompt_tokens,
                candidates_token_count: usage.completion_tokens,
                total_token_count: usage.total_tokens,
            }),
            model_version: None,
        }
    }
}

// --- chunk conversions ---

impl From<GeminiChunkResponse> for UnifiedChunkResponse {
    fn from(chunk: GeminiChunkResponse) -> Self {
        let usage = chunk.usage_metadata.as_ref().map(|usage| UnifiedUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        });
        let choices = chunk
            .candidates
            .iter()
            .map(|candidate| {
                let (content, tool_calls) = match candidate_content(candidate) {
                    (UnifiedContent::Text(text), _) => {
                        (if text.is_empty() { None } else { Some(text) }, None)
                    }
                    (UnifiedContent::ToolCalls(calls), _) => (None, Some(calls)),
                    _ => (None, None),
                };
                UnifiedChunkChoice {
                    index: candidate.index,
                    delta: UnifiedDelta {
                        role: None,
                        content,
                        tool_calls,
                    },
                    finish_reason: candidate
                        .finish_reason
                        .as_deref()
                        .and_then(finish_reason_from_gemini),
                }
            })
            .collect();
        UnifiedChunkResponse {
            id: format!("chatcmpl-{}", ID_GENERATOR.generate_id()),
            model: chunk.model_version.unwrap_or_else(|| "gemini".to_string()),
            choices,
            usage,
            created: None,
        }
    }
}

impl From<UnifiedChunkResponse> for GeminiChunkResponse {
    fn from(chunk: UnifiedChunkResponse) -> Self {
        let candidates = chunk
            .choices
            .iter()
            .filter_map(|choice| {
                let mut parts = Vec::new();
                if let Some(text) = &choice.delta.content {
                    if !text.is_empty() {
                        parts.push(json!({"text": text}));
                    }
                }
                if let Some(calls) = &choice.delta.tool_calls {
                    for call in calls {
                        parts.push(json!({
                            "functionCall": {
                                "name": call.name,
                                "args": normalize_arguments(&call.arguments),
                            }
                        }));
                    }
                }
                if parts.is_empty() && choice.finish_reason.is_none() {
                    return None;
                }
                Some(GeminiCandidate {
                    index: choice.index,
                    content: if parts.is_empty() {
                        None
                    } else {
                        Some(GeminiContent {
                            role: Some("model".to_string()),
                            parts,
                        })
                    },
                    finish_reason: choice
                        .finish_reason
                        .map(|reason| finish_reason_to_gemini(reason).to_string()),
                })
            })
            .collect();
        GeminiChunkResponse {
            candidates,
            usage_metadata: chunk.usage.map(|usage| GeminiUsageMetadata {
                prompt_token_count: usage.prompt_tokens,
                candidates_token_count: usage.completion_tokens,
                total_token_count: usage.total_tokens,
            }),
            model_version: None,
        }
    }
}
