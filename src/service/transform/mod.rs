use serde_json::{json, Value};
use tracing::{debug, error};

use crate::schema::enum_def::ApiDialect;
use crate::utils::sse::SseEvent;
use crate::utils::ID_GENERATOR;

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod responses;
pub mod unified;

use unified::*;

/// Translates an inbound request body into the target dialect. Identity when
/// the dialects already match; on any parse failure the original body is
/// passed through untouched and the upstream gets to complain.
pub fn transform_request_data(
    data: Value,
    dialect: ApiDialect,
    target: ApiDialect,
    is_stream: bool,
) -> Value {
    if dialect == target {
        return data;
    }
    debug!(
        "translating request body {:?} -> {:?} (stream: {})",
        dialect, target, is_stream
    );

    macro_rules! lower {
        ($type:ty, $name:expr) => {
            match serde_json::from_value::<$type>(data.clone()) {
                Ok(payload) => payload.into(),
                Err(e) => {
                    error!("failed to parse {} request, passing through: {}", $name, e);
                    return data;
                }
            }
        };
    }

    let mut unified: UnifiedRequest = match dialect {
        ApiDialect::OpenAiChat => lower!(openai::OpenAiRequestPayload, "openai"),
        ApiDialect::OpenAiResponses => lower!(responses::ResponsesRequestPayload, "responses"),
        ApiDialect::ClaudeMessages => lower!(claude::ClaudeRequestPayload, "claude"),
        ApiDialect::GeminiGenerate => lower!(gemini::GeminiRequestPayload, "gemini"),
    };

    // The route decides streaming, not whatever the body happened to say.
    unified.stream = is_stream;

    let raised = match target {
        ApiDialect::OpenAiChat | ApiDialect::OpenAiResponses => {
            serde_json::to_value(openai::OpenAiRequestPayload::from(unified))
        }
        ApiDialect::ClaudeMessages => {
            serde_json::to_value(claude::ClaudeRequestPayload::from(unified))
        }
        ApiDialect::GeminiGenerate => {
            serde_json::to_value(gemini::GeminiRequestPayload::from(unified))
        }
    };

    match raised {
        Ok(value) => value,
        Err(e) => {
            error!("failed to serialize translated request: {}", e);
            data
        }
    }
}

/// Translates a complete upstream response body (native dialect `from`) into
/// the inbound dialect `to`.
pub fn transform_result(data: Value, from: ApiDialect, to: ApiDialect) -> Value {
    if from == to {
        return data;
    }

    let unified: Result<UnifiedResponse, _> = match from {
        ApiDialect::OpenAiChat | ApiDialect::OpenAiResponses => {
            serde_json::from_value::<openai::OpenAiResponse>(data.clone()).map(Into::into)
        }
        ApiDialect::ClaudeMessages => {
            serde_json::from_value::<claude::ClaudeResponse>(data.clone()).map(Into::into)
        }
        ApiDialect::GeminiGenerate => {
            serde_json::from_value::<gemini::GeminiResponse>(data.clone()).map(Into::into)
        }
    };
    let unified = match unified {
        Ok(unified) => unified,
        Err(e) => {
            error!(
                "failed to parse {:?} response, passing through: {}",
                from, e
            );
            return data;
        }
    };

    let raised = match to {
        ApiDialect::OpenAiChat => serde_json::to_value(openai::OpenAiResponse::from(unified)),
        ApiDialect::OpenAiResponses => {
            serde_json::to_value(responses::ResponsesResponse::from(unified))
        }
        ApiDialect::ClaudeMessages => serde_json::to_value(claude::ClaudeResponse::from(unified)),
        ApiDialect::GeminiGenerate => serde_json::to_value(gemini::GeminiResponse::from(unified)),
    };
    match raised {
        Ok(value) => value,
        Err(e) => {
            error!("failed to serialize translated response: {}", e);
            data
        }
    }
}

/// Re-frames a stream of upstream events (native dialect `from`) into the
/// event framing the inbound dialect `to` expects. Stateful: Claude targets
/// need a synthesized envelope sequence, OpenAI targets need a consistent
/// chunk id, and every target needs its own idea of how a stream ends.
pub struct StreamTransformer {
    from: ApiDialect,
    to: ApiDialect,
    stream_id: Option<String>,
    // Claude-target envelope state.
    sent_message_start: bool,
    content_block_open: bool,
    sent_finish: bool,
    // Responses-target state.
    sent_response_created: bool,
    last_usage: Option<UnifiedUsage>,
}

impl StreamTransformer {
    pub fn new(from: ApiDialect, to: ApiDialect) -> Self {
        Self {
            from,
            to,
            stream_id: None,
            sent_message_start: false,
            content_block_open: false,
            sent_finish: false,
            sent_response_created: false,
            last_usage: None,
        }
    }

    fn stream_id(&mut self) -> String {
        if let Some(id) = &self.stream_id {
            return id.clone();
        }
        let id = format!("chatcmpl-{}", ID_GENERATOR.generate_id());
        self.stream_id = Some(id.clone());
        id
    }

    /// Translates one upstream SSE event into zero or more client events.
    pub fn transform_event(&mut self, event: SseEvent) -> Vec<SseEvent> {
        if self.from == self.to {
            return vec![event];
        }

        // OpenAI's terminal marker is framing, not payload.
        if self.from.is_openai_shaped() && event.data == "[DONE]" {
            return Vec::new();
        }
        if event.data.is_empty() {
            return Vec::new();
        }

        let chunk = self.lower_chunk(&event);
        let mut chunk = match chunk {
            Some(chunk) => chunk,
            None => return Vec::new(),
        };

        chunk.id = self.stream_id();
        if let Some(usage) = &chunk.usage {
            self.last_usage = Some(usage.clone());
        }

        self.raise_chunk(chunk)
    }

    /// Events that close the stream in the inbound dialect's framing. Called
    /// once, after the upstream stream ends.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.from == self.to {
            return Vec::new();
        }
        match self.to {
            ApiDialect::OpenAiChat => vec![SseEvent::data("[DONE]")],
            ApiDialect::ClaudeMessages => {
                let mut events = Vec::new();
                if self.content_block_open {
                    self.content_block_open = false;
                    events.push(SseEvent::named(
                        "content_block_stop",
                        json!({"type": "content_block_stop", "index": 0}).to_string(),
                    ));
                }
                if self.sent_message_start {
                    if !self.sent_finish {
                        events.push(SseEvent::named(
                            "message_delta",
                            json!({
                                "type": "message_delta",
                                "delta": {"stop_reason": "end_turn", "stop_sequence": null},
                                "usage": {"output_tokens": self.last_usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0)},
                            })
                            .to_string(),
                        ));
                    }
                    events.push(SseEvent::named(
                        "message_stop",
                        json!({"type": "message_stop"}).to_string(),
                    ));
                }
                events
            }
            ApiDialect::OpenAiResponses => {
                let id = self.stream_id();
                let mut response = json!({
                    "id": id,
                    "object": "response",
                    "status": "completed",
                });
                if let Some(usage) = &self.last_usage {
                    response["usage"] = json!({
                        "input_tokens": usage.prompt_tokens,
                        "output_tokens": usage.completion_tokens,
                        "total_tokens": usage.total_tokens,
                    });
                }
                vec![SseEvent::named(
                    "response.completed",
                    json!({"type": "response.completed", "response": response}).to_string(),
                )]
            }
            ApiDialect::GeminiGenerate => Vec::new(),
        }
    }

    fn lower_chunk(&self, event: &SseEvent) -> Option<UnifiedChunkResponse> {
        match self.from {
            ApiDialect::OpenAiChat | ApiDialect::OpenAiResponses => {
                match serde_json::from_str::<openai::OpenAiChunkResponse>(&event.data) {
                    Ok(chunk) => Some(chunk.into()),
                    Err(e) => {
                        error!("unparseable openai chunk, dropping: {} ({})", e, event.data);
                        None
                    }
                }
            }
            ApiDialect::ClaudeMessages => {
                match serde_json::from_str::<claude::ClaudeEvent>(&event.data) {
                    Ok(claude_event) => claude_event.into_unified_chunk(),
                    Err(e) => {
                        error!("unparseable claude event, dropping: {} ({})", e, event.data);
                        None
                    }
                }
            }
            ApiDialect::GeminiGenerate => {
                match serde_json::from_str::<gemini::GeminiChunkResponse>(&event.data) {
                    Ok(chunk) => Some(chunk.into()),
                    Err(e) => {
                        error!("unparseable gemini chunk, dropping: {} ({})", e, event.data);
                        None
                    }
                }
            }
        }
    }

    fn raise_chunk(&mut self, chunk: UnifiedChunkResponse) -> Vec<SseEvent> {
        match self.to {
            ApiDialect::OpenAiChat => {
                let value = match serde_json::to_value(openai::OpenAiChunkResponse::from(chunk)) {
                    Ok(value) => value,
                    Err(_) => return Vec::new(),
                };
                vec![SseEvent::data(value.to_string())]
            }
            ApiDialect::GeminiGenerate => {
                let raised = gemini::GeminiChunkResponse::from(chunk);
                if raised.candidates.is_empty() && raised.usage_metadata.is_none() {
                    return Vec::new();
                }
                match serde_json::to_value(raised) {
                    Ok(value) => vec![SseEvent::data(value.to_string())],
                    Err(_) => Vec::new(),
                }
            }
            ApiDialect::ClaudeMessages => self.raise_claude_events(chunk),
            ApiDialect::OpenAiResponses => self.raise_responses_events(chunk),
        }
    }

    fn raise_claude_events(&mut self, chunk: UnifiedChunkResponse) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.sent_message_start {
            self.sent_message_start = true;
            events.push(SseEvent::named(
                "message_start",
                json!({
                    "type": "message_start",
                    "message": {
                        "id": chunk.id,
                        "type": "message",
                        "role": "assistant",
                        "content": [],
                        "model": chunk.model,
                        "stop_reason": null,
                        "usage": {"input_tokens": 0, "output_tokens": 0},
                    }
                })
                .to_string(),
            ));
        }
        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content {
                if !text.is_empty() {
                    if !self.content_block_open {
                        self.content_block_open = true;
                        events.push(SseEvent::named(
                            "content_block_start",
                            json!({
                                "type": "content_block_start",
                                "index": 0,
                                "content_block": {"type": "text", "text": ""},
                            })
                            .to_string(),
                        ));
                    }
                    events.push(SseEvent::named(
                        "content_block_delta",
                        json!({
                            "type": "content_block_delta",
                            "index": 0,
                            "delta": {"type": "text_delta", "text": text},
                        })
                        .to_string(),
                    ));
                }
            }
            if let Some(reason) = choice.finish_reason {
                if self.content_block_open {
                    self.content_block_open = false;
                    events.push(SseEvent::named(
                        "content_block_stop",
                        json!({"type": "content_block_stop", "index": 0}).to_string(),
                    ));
                }
                self.sent_finish = true;
                let output_tokens = chunk
                    .usage
                    .as_ref()
                    .or(self.last_usage.as_ref())
                    .map(|u| u.completion_tokens)
                    .unwrap_or(0);
                events.push(SseEvent::named(
                    "message_delta",
                    json!({
                        "type": "message_delta",
                        "delta": {
                            "stop_reason": claude::finish_reason_to_claude(reason),
                            "stop_sequence": null,
                        },
                        "usage": {"output_tokens": output_tokens},
                    })
                    .to_string(),
                ));
            }
        }
        events
    }

    fn raise_responses_events(&mut self, chunk: UnifiedChunkResponse) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.sent_response_created {
            self.sent_response_created = true;
            events.push(SseEvent::named(
                "response.created",
                json!({
                    "type": "response.created",
                    "response": {"id": chunk.id, "object": "response", "status": "in_progress"},
                })
                .to_string(),
            ));
        }
        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content {
                if !text.is_empty() {
                    events.push(SseEvent::named(
                        "response.output_text.delta",
                        json!({"type": "response.output_text.delta", "delta": text}).to_string(),
                    ));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_translation_is_untouched() {
        let body = json!({"model": "gpt-x", "messages": [{"role": "user", "content": "hi"}]});
        let out = transform_request_data(
            body.clone(),
            ApiDialect::OpenAiChat,
            ApiDialect::OpenAiChat,
            false,
        );
        assert_eq!(out, body);
    }

    #[test]
    fn openai_request_lowers_into_claude() {
        let body = json!({
            "model": "gpt-x",
            "messages": [
                {"role": "system", "content": "Be terse."},
                {"role": "user", "content": "Hello"}
            ],
            "max_tokens": 128,
            "temperature": 0.3,
            "stop": "END"
        });
        let out = transform_request_data(
            body,
            ApiDialect::OpenAiChat,
            ApiDialect::ClaudeMessages,
            false,
        );
        assert_eq!(out["system"], json!("Be terse."));
        assert_eq!(out["max_tokens"], json!(128));
        assert_eq!(out["temperature"], json!(0.3));
        assert_eq!(out["stop_sequences"], json!(["END"]));
        assert_eq!(out["messages"], json!([{"role": "user", "content": "Hello"}]));
        assert!(out.get("stream").is_none());
    }

    #[test]
    fn claude_request_lowers_into_openai() {
        let body = json!({
            "model": "claude-s",
            "max_tokens": 256,
            "system": "Be helpful.",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "Hi"}]}]
        });
        let out = transform_request_data(
            body,
            ApiDialect::ClaudeMessages,
            ApiDialect::OpenAiChat,
            true,
        );
        assert_eq!(
            out["messages"],
            json!([
                {"role": "system", "content": "Be helpful."},
                {"role": "user", "content": "Hi"}
            ])
        );
        assert_eq!(out["stream"], json!(true));
        assert_eq!(out["max_tokens"], json!(256));
    }

    #[test]
    fn openai_request_lowers_into_gemini() {
        let body = json!({
            "model": "gpt-x",
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "What is the weather in Boston?"}
            ],
            "temperature": 0.5,
            "max_tokens": 100,
            "top_p": 0.9
        });
        let out = transform_request_data(
            body,
            ApiDialect::OpenAiChat,
            ApiDialect::GeminiGenerate,
            false,
        );
        assert_eq!(
            out["system_instruction"]["parts"],
            json!([{"text": "You are a helpful assistant."}])
        );
        assert_eq!(
            out["contents"],
            json!([{"role": "user", "parts": [{"text": "What is the weather in Boston?"}]}])
        );
        assert_eq!(out["generationConfig"]["maxOutputTokens"], json!(100));
        assert_eq!(out["generationConfig"]["topP"], json!(0.9));
    }

    #[test]
    fn responses_request_lowers_into_claude() {
        let body = json!({
            "model": "gpt-x",
            "instructions": "Answer briefly.",
            "input": "What is an ability table?"
        });
        let out = transform_request_data(
            body,
            ApiDialect::OpenAiResponses,
            ApiDialect::ClaudeMessages,
            false,
        );
        assert_eq!(out["system"], json!("Answer briefly."));
        assert_eq!(
            out["messages"],
            json!([{"role": "user", "content": "What is an ability table?"}])
        );
    }

    #[test]
    fn malformed_request_passes_through() {
        let body = json!({"messages": "not an array"});
        let out = transform_request_data(
            body.clone(),
            ApiDialect::OpenAiChat,
            ApiDialect::ClaudeMessages,
            false,
        );
        assert_eq!(out, body);
    }

    #[test]
    fn claude_response_raises_into_openai() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello there"}],
            "model": "claude-s",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        });
        let out = transform_result(body, ApiDialect::ClaudeMessages, ApiDialect::OpenAiChat);
        assert_eq!(out["object"], json!("chat.completion"));
        assert_eq!(out["choices"][0]["message"]["content"], json!("Hello there"));
        assert_eq!(out["choices"][0]["finish_reason"], json!("stop"));
        assert_eq!(out["usage"]["total_tokens"], json!(14));
    }

    #[test]
    fn openai_response_raises_into_claude_with_tools() {
        let body = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-x",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Boston\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12}
        });
        let out = transform_result(body, ApiDialect::OpenAiChat, ApiDialect::ClaudeMessages);
        assert_eq!(out["stop_reason"], json!("tool_use"));
        assert_eq!(out["content"][0]["type"], json!("tool_use"));
        assert_eq!(out["content"][0]["name"], json!("get_weather"));
        assert_eq!(out["content"][0]["input"], json!({"city": "Boston"}));
        assert_eq!(out["usage"]["input_tokens"], json!(7));
    }

    #[test]
    fn gemini_response_raises_into_openai() {
        let body = json!({
            "candidates": [{
                "index": 0,
                "content": {"role": "model", "parts": [{"text": "Tides are caused by gravity."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 8, "totalTokenCount": 14}
        });
        let out = transform_result(body, ApiDialect::GeminiGenerate, ApiDialect::OpenAiChat);
        assert_eq!(
            out["choices"][0]["message"]["content"],
            json!("Tides are caused by gravity.")
        );
        assert_eq!(out["choices"][0]["finish_reason"], json!("stop"));
        assert_eq!(out["usage"]["prompt_tokens"], json!(6));
    }

    #[test]
    fn chat_response_raises_into_responses_shape() {
        let body = json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 5,
            "model": "gpt-x",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Done."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        });
        let out = transform_result(body, ApiDialect::OpenAiChat, ApiDialect::OpenAiResponses);
        assert_eq!(out["object"], json!("response"));
        assert_eq!(out["status"], json!("completed"));
        assert_eq!(out["output"][0]["content"][0]["text"], json!("Done."));
        assert_eq!(out["usage"]["input_tokens"], json!(3));
    }

    #[test]
    fn gemini_chunk_reframes_as_openai_chunk() {
        let mut transformer =
            StreamTransformer::new(ApiDialect::GeminiGenerate, ApiDialect::OpenAiChat);
        let events = transformer.transform_event(SseEvent::data(
            json!({"candidates": [{"index": 0, "content": {"role": "model", "parts": [{"text": "Hi"}]}}]})
                .to_string(),
        ));
        assert_eq!(events.len(), 1);
        let chunk: Value = serde_json::from_str(&events[0].data).unwrap();
        assert_eq!(chunk["object"], json!("chat.completion.chunk"));
        assert_eq!(chunk["choices"][0]["delta"]["content"], json!("Hi"));

        let trailing = transformer.finish();
        assert_eq!(trailing.len(), 1);
        assert_eq!(trailing[0].data, "[DONE]");
    }

    #[test]
    fn openai_chunk_ids_stay_consistent() {
        let mut transformer =
            StreamTransformer::new(ApiDialect::GeminiGenerate, ApiDialect::OpenAiChat);
        let chunk = |text: &str| {
            SseEvent::data(
                json!({"candidates": [{"index": 0, "content": {"parts": [{"text": text}]}}]})
                    .to_string(),
            )
        };
        let first = transformer.transform_event(chunk("a"));
        let second = transformer.transform_event(chunk("b"));
        let first_id: Value = serde_json::from_str(&first[0].data).unwrap();
        let second_id: Value = serde_json::from_str(&second[0].data).unwrap();
        assert_eq!(first_id["id"], second_id["id"]);
    }

    #[test]
    fn openai_stream_synthesizes_claude_envelopes() {
        let mut transformer =
            StreamTransformer::new(ApiDialect::OpenAiChat, ApiDialect::ClaudeMessages);
        let delta = SseEvent::data(
            json!({
                "id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"content": "Hel"}}]
            })
            .to_string(),
        );
        let events = transformer.transform_event(delta);
        let names: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
        assert_eq!(
            names,
            vec!["message_start", "content_block_start", "content_block_delta"]
        );

        let finish = SseEvent::data(
            json!({
                "id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6}
            })
            .to_string(),
        );
        let events = transformer.transform_event(finish);
        let names: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
        assert_eq!(names, vec!["content_block_stop", "message_delta"]);
        let delta_event: Value = serde_json::from_str(&events[1].data).unwrap();
        assert_eq!(delta_event["delta"]["stop_reason"], json!("end_turn"));
        assert_eq!(delta_event["usage"]["output_tokens"], json!(2));

        let trailing = transformer.finish();
        let names: Vec<_> = trailing.iter().filter_map(|e| e.event.as_deref()).collect();
        assert_eq!(names, vec!["message_stop"]);
    }

    #[test]
    fn claude_stream_reframes_as_openai_chunks() {
        let mut transformer =
            StreamTransformer::new(ApiDialect::ClaudeMessages, ApiDialect::OpenAiChat);
        let start = transformer.transform_event(SseEvent::named(
            "message_start",
            json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude-s", "usage": {"input_tokens": 3}}})
                .to_string(),
        ));
        assert_eq!(start.len(), 1);
        let delta = transformer.transform_event(SseEvent::named(
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hey"}})
                .to_string(),
        ));
        let chunk: Value = serde_json::from_str(&delta[0].data).unwrap();
        assert_eq!(chunk["choices"][0]["delta"]["content"], json!("Hey"));
        // Pings carry nothing forwardable.
        let ping = transformer
            .transform_event(SseEvent::named("ping", json!({"type": "ping"}).to_string()));
        assert!(ping.is_empty());
    }

    #[test]
    fn done_marker_is_swallowed_for_non_openai_targets() {
        let mut transformer =
            StreamTransformer::new(ApiDialect::OpenAiChat, ApiDialect::ClaudeMessages);
        assert!(transformer.transform_event(SseEvent::data("[DONE]")).is_empty());
    }
}
