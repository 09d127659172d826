use serde_json::Value;

use crate::schema::enum_def::ApiDialect;
use crate::utils::tokenizer;

/// The integer fixed-point scale turning dollars into ledger units.
pub const QUOTA_PER_UNIT: f64 = 500_000.0;

/// quota = round(tokens * price_per_1M / 1e6 * QUOTA_PER_UNIT), floored at 0.
pub fn calc_quota_from_tokens(tokens: i64, price_per_1m: f64) -> i64 {
    if tokens <= 0 || price_per_1m <= 0.0 {
        return 0;
    }
    ((tokens as f64) * price_per_1m / 1_000_000.0 * QUOTA_PER_UNIT).round() as i64
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
    pub prompt_audio_tokens: i32,
    pub completion_audio_tokens: i32,
    pub cached_tokens: i32,
    pub reasoning_tokens: i32,
}

impl UsageInfo {
    pub fn billable_tokens(&self) -> i64 {
        let total = if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        };
        total as i64
    }
}

fn as_i32(value: Option<&Value>) -> i32 {
    value.and_then(Value::as_i64).unwrap_or(0) as i32
}

/// Parses a complete (non-streaming) response body's usage block in the given
/// native dialect. Returns None when the upstream reported nothing.
pub fn parse_usage_info(body: &Value, dialect: ApiDialect) -> Option<UsageInfo> {
    match dialect {
        ApiDialect::OpenAiChat | ApiDialect::OpenAiResponses => {
            let usage = body.get("usage").filter(|u| !u.is_null())?;
            // Chat reports prompt/completion, responses reports input/output.
            let prompt_tokens = usage
                .get("prompt_tokens")
                .or_else(|| usage.get("input_tokens"))
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32;
            let completion_tokens = usage
                .get("completion_tokens")
                .or_else(|| usage.get("output_tokens"))
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32;
            let prompt_details = usage
                .get("prompt_tokens_details")
                .or_else(|| usage.get("input_tokens_details"));
            let completion_details = usage
                .get("completion_tokens_details")
                .or_else(|| usage.get("output_tokens_details"));
            Some(UsageInfo {
                prompt_tokens,
                completion_tokens,
                total_tokens: as_i32(usage.get("total_tokens")),
                prompt_audio_tokens: as_i32(prompt_details.and_then(|d| d.get("audio_tokens"))),
                completion_audio_tokens: as_i32(
                    completion_details.and_then(|d| d.get("audio_tokens")),
                ),
                cached_tokens: as_i32(prompt_details.and_then(|d| d.get("cached_tokens"))),
                reasoning_tokens: as_i32(
                    completion_details.and_then(|d| d.get("reasoning_tokens")),
                ),
            })
        }
        ApiDialect::ClaudeMessages => {
            let usage = body.get("usage").filter(|u| !u.is_null())?;
            let prompt_tokens = as_i32(usage.get("input_tokens"));
            let completion_tokens = as_i32(usage.get("output_tokens"));
            Some(UsageInfo {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                cached_tokens: as_i32(usage.get("cache_read_input_tokens")),
                ..Default::default()
            })
        }
        ApiDialect::GeminiGenerate => {
            let usage = body.get("usageMetadata").filter(|u| !u.is_null())?;
            Some(UsageInfo {
                prompt_tokens: as_i32(usage.get("promptTokenCount")),
                completion_tokens: as_i32(usage.get("candidatesTokenCount")),
                total_tokens: as_i32(usage.get("totalTokenCount")),
                cached_tokens: as_i32(usage.get("cachedContentTokenCount")),
                reasoning_tokens: as_i32(usage.get("thoughtsTokenCount")),
                ..Default::default()
            })
        }
    }
}

/// Tallies usage across a stream of upstream events in the channel's native
/// dialect. Claude splits usage across message_start/message_delta; OpenAI and
/// Gemini report cumulative blocks that are replaced wholesale. Completion text
/// is collected so a stream with no usage block can still be tokenized locally.
#[derive(Debug)]
pub struct UsageAccumulator {
    dialect: ApiDialect,
    info: UsageInfo,
    saw_usage: bool,
    completion_text: String,
    prompt_fallback_tokens: i32,
}

impl UsageAccumulator {
    pub fn new(dialect: ApiDialect, prompt_fallback_tokens: i32) -> Self {
        Self {
            dialect,
            info: UsageInfo::default(),
            saw_usage: false,
            completion_text: String::new(),
            prompt_fallback_tokens,
        }
    }

    pub fn observe(&mut self, chunk: &Value) {
        match self.dialect {
            ApiDialect::ClaudeMessages => self.observe_claude(chunk),
            _ => {
                if let Some(usage) = parse_usage_info(chunk, self.dialect)
                    .or_else(|| self.nested_responses_usage(chunk))
                {
                    self.info = usage;
                    self.saw_usage = true;
                }
            }
        }
        self.collect_completion_text(chunk);
    }

    // The responses dialect nests its final usage under `response`.
    fn nested_responses_usage(&self, chunk: &Value) -> Option<UsageInfo> {
        if self.dialect != ApiDialect::OpenAiResponses {
            return None;
        }
        parse_usage_info(chunk.get("response")?, self.dialect)
    }

    fn observe_claude(&mut self, chunk: &Value) {
        let event_type = chunk.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "message_start" => {
                if let Some(usage) = chunk
                    .get("message")
                    .and_then(|m| m.get("usage"))
                    .filter(|u| !u.is_null())
                {
                    self.info.prompt_tokens = as_i32(usage.get("input_tokens"));
                    self.info.cached_tokens = as_i32(usage.get("cache_read_input_tokens"));
                    self.saw_usage = true;
                }
            }
            "message_delta" => {
                if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
                    // Cumulative, not incremental.
                    self.info.completion_tokens = as_i32(usage.get("output_tokens"));
                    self.saw_usage = true;
                }
            }
            _ => {}
        }
        self.info.total_tokens = self.info.prompt_tokens + self.info.completion_tokens;
    }

    fn collect_completion_text(&mut self, chunk: &Value) {
        match self.dialect {
            ApiDialect::OpenAiChat => {
                if let Some(choices) = chunk.get("choices").and_then(Value::as_array) {
                    for choice in choices {
                        if let Some(text) = choice
                            .get("delta")
                            .and_then(|d| d.get("content"))
                            .and_then(Value::as_str)
                        {
                            self.completion_text.push_str(text);
                        }
                    }
                }
            }
            ApiDialect::OpenAiResponses => {
                if let Some(text) = chunk.get("delta").and_then(Value::as_str) {
                    self.completion_text.push_str(text);
                }
            }
            ApiDialect::ClaudeMessages => {
                if let Some(text) = chunk
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
                {
                    self.completion_text.push_str(text);
                }
            }
            ApiDialect::GeminiGenerate => {
                if let Some(candidates) = chunk.get("candidates").and_then(Value::as_array) {
                    for candidate in candidates {
                        if let Some(parts) = candidate
                            .get("content")
                            .and_then(|c| c.get("parts"))
                            .and_then(Value::as_array)
                        {
                            for part in parts {
                                if let Some(text) = part.get("text").and_then(Value::as_str) {
                                    self.completion_text.push_str(text);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Final usage record. When the upstream never reported usage, completion
    /// tokens are counted locally and the prompt falls back to the estimate
    /// made at pre-charge time.
    pub fn finish(self) -> UsageInfo {
        if self.saw_usage {
            return self.info;
        }
        let completion_tokens = if self.completion_text.is_empty() {
            0
        } else {
            tokenizer::count_text_tokens(&self.completion_text)
        };
        let prompt_tokens = if completion_tokens > 0 {
            self.prompt_fallback_tokens
        } else {
            0
        };
        UsageInfo {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quota_math_follows_the_price_invariant() {
        // 150 tokens at $1.00/1M: 150 * 1.0 / 1e6 * 500000 = 75
        assert_eq!(calc_quota_from_tokens(150, 1.0), 75);
        assert_eq!(calc_quota_from_tokens(0, 1.0), 0);
        assert_eq!(calc_quota_from_tokens(-5, 1.0), 0);
        assert_eq!(calc_quota_from_tokens(150, 0.0), 0);
        // Rounds to nearest: 1 token at $1/1M is 0.5 units.
        assert_eq!(calc_quota_from_tokens(1, 1.0), 1);
    }

    #[test]
    fn parses_openai_chat_usage() {
        let body = json!({
            "usage": {
                "prompt_tokens": 100,
                "completion_tokens": 50,
                "total_tokens": 150,
                "completion_tokens_details": {"reasoning_tokens": 8, "audio_tokens": 2}
            }
        });
        let usage = parse_usage_info(&body, ApiDialect::OpenAiChat).unwrap();
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.completion_tokens, 50);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.reasoning_tokens, 8);
        assert_eq!(usage.completion_audio_tokens, 2);
    }

    #[test]
    fn parses_responses_usage_naming() {
        let body = json!({"usage": {"input_tokens": 10, "output_tokens": 4, "total_tokens": 14}});
        let usage = parse_usage_info(&body, ApiDialect::OpenAiResponses).unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 4);
    }

    #[test]
    fn parses_claude_usage() {
        let body = json!({"usage": {"input_tokens": 30, "output_tokens": 12, "cache_read_input_tokens": 5}});
        let usage = parse_usage_info(&body, ApiDialect::ClaudeMessages).unwrap();
        assert_eq!(usage.prompt_tokens, 30);
        assert_eq!(usage.completion_tokens, 12);
        assert_eq!(usage.total_tokens, 42);
        assert_eq!(usage.cached_tokens, 5);
    }

    #[test]
    fn parses_gemini_usage_metadata() {
        let body = json!({"usageMetadata": {"promptTokenCount": 9, "candidatesTokenCount": 7, "totalTokenCount": 16}});
        let usage = parse_usage_info(&body, ApiDialect::GeminiGenerate).unwrap();
        assert_eq!(usage.prompt_tokens, 9);
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, 16);
    }

    #[test]
    fn missing_usage_is_none() {
        assert!(parse_usage_info(&json!({"choices": []}), ApiDialect::OpenAiChat).is_none());
        assert!(parse_usage_info(&json!({"usage": null}), ApiDialect::ClaudeMessages).is_none());
    }

    #[test]
    fn accumulates_claude_split_usage() {
        let mut acc = UsageAccumulator::new(ApiDialect::ClaudeMessages, 0);
        acc.observe(&json!({
            "type": "message_start",
            "message": {"usage": {"input_tokens": 25}}
        }));
        acc.observe(&json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "hi"}}));
        acc.observe(&json!({"type": "message_delta", "usage": {"output_tokens": 6}}));
        acc.observe(&json!({"type": "message_delta", "usage": {"output_tokens": 11}}));
        let usage = acc.finish();
        assert_eq!(usage.prompt_tokens, 25);
        assert_eq!(usage.completion_tokens, 11);
        assert_eq!(usage.total_tokens, 36);
    }

    #[test]
    fn openai_stream_usage_replaces_wholesale() {
        let mut acc = UsageAccumulator::new(ApiDialect::OpenAiChat, 0);
        acc.observe(&json!({"choices": [{"index": 0, "delta": {"content": "partial"}}]}));
        acc.observe(&json!({
            "choices": [],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }));
        let usage = acc.finish();
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn falls_back_to_local_count_without_usage() {
        let mut acc = UsageAccumulator::new(ApiDialect::OpenAiChat, 40);
        acc.observe(&json!({"choices": [{"index": 0, "delta": {"content": "hello world, counted locally"}}]}));
        let usage = acc.finish();
        assert!(usage.completion_tokens > 0);
        assert_eq!(usage.prompt_tokens, 40);
    }

    #[test]
    fn empty_stream_finishes_with_zero_tokens() {
        let acc = UsageAccumulator::new(ApiDialect::GeminiGenerate, 40);
        let usage = acc.finish();
        assert_eq!(usage.billable_tokens(), 0);
    }
}
