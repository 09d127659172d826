use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dialect-neutral request/response shapes. Every inbound dialect lowers into
/// these, every outbound dialect is raised from them, so adding a dialect
/// costs two conversions instead of N.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnifiedRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedToolCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments object; serialized per-dialect (OpenAI wants a JSON
    /// string, Gemini wants the object).
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UnifiedContent {
    Text(String),
    ToolCalls(Vec<UnifiedToolCall>),
    ToolResult(UnifiedToolResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMessage {
    pub role: UnifiedRole,
    pub content: UnifiedContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedFunction {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnifiedRequest {
    pub model: Option<String>,
    pub messages: Vec<UnifiedMessage>,
    pub tools: Option<Vec<UnifiedFunction>>,
    pub stream: bool,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UnifiedUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Dialect-neutral finish reason; each dialect has a spelling for these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedFinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedChoice {
    pub index: u32,
    pub message: UnifiedMessage,
    pub finish_reason: Option<UnifiedFinishReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<UnifiedChoice>,
    pub usage: Option<UnifiedUsage>,
    pub created: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UnifiedDelta {
    pub role: Option<UnifiedRole>,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<UnifiedToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedChunkChoice {
    pub index: u32,
    pub delta: UnifiedDelta,
    pub finish_reason: Option<UnifiedFinishReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnifiedChunkResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<UnifiedChunkChoice>,
    pub usage: Option<UnifiedUsage>,
    pub created: Option<i64>,
}

impl UnifiedRequest {
    /// Peels leading system messages into a separate prompt, the shape Claude
    /// and Gemini want.
    pub fn split_system_prompt(&self) -> (Option<String>, Vec<&UnifiedMessage>) {
        let mut system = String::new();
        let mut rest = Vec::new();
        for message in &self.messages {
            match (&message.role, &message.content) {
                (UnifiedRole::System, UnifiedContent::Text(text)) => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(text);
                }
                _ => rest.push(message),
            }
        }
        let system = if system.is_empty() {
            None
        } else {
            Some(system)
        };
        (system, rest)
    }
}
