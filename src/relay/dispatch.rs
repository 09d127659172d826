use std::io::Read;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{CONTENT_ENCODING, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::Response,
};
use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info as log_info, warn};

use crate::database::ability::Ability;
use crate::database::channel::Channel;
use crate::database::token::Token;
use crate::database::user::User;
use crate::relay::adapter::{self, Adaptor};
use crate::relay::error::RelayError;
use crate::relay::info::RelayInfo;
use crate::relay::{ledger, pricing, select};
use crate::schema::enum_def::{ApiDialect, RelayMode, CHANNEL_STATUS_AUTO_DISABLED};
use crate::service::settings;
use crate::service::transform::{transform_result, StreamTransformer};
use crate::utils::billing::{parse_usage_info, UsageAccumulator, UsageInfo};
use crate::utils::sse::SseParser;
use crate::utils::tokenizer;

const UNARY_TIMEOUT: Duration = Duration::from_secs(120);
const STREAM_TIMEOUT: Duration = Duration::from_secs(600);
/// How long the pump keeps draining the upstream for a usage block after the
/// client went away.
const DISCONNECT_DRAIN: Duration = Duration::from_secs(5);

/// Everything a relay route handler hands to the dispatcher.
pub struct RelayRequest {
    pub token: Token,
    pub user: User,
    pub dialect: ApiDialect,
    pub relay_mode: RelayMode,
    /// Model from the URL path (Gemini-shaped routes); otherwise the body's
    /// `model` field is used.
    pub path_model: Option<String>,
    /// Streaming forced by the route (Gemini `:streamGenerateContent`).
    pub path_stream: Option<bool>,
    /// Admin-set group override; wins over token and user groups.
    pub auto_group: Option<String>,
    pub is_playground: bool,
    pub body: Value,
}

/// The request state machine:
/// RESOLVE -> PRE_CHARGE -> ADAPT -> CALL -> STREAM -> POST_CHARGE -> LOG,
/// with refund-and-retry loops back to RESOLVE on retriable upstream faults.
pub async fn relay(request: RelayRequest) -> Response {
    let dialect = request.dialect;
    match relay_inner(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(dialect),
    }
}

async fn relay_inner(request: RelayRequest) -> Result<Response, RelayError> {
    let RelayRequest {
        token,
        user,
        dialect,
        relay_mode,
        path_model,
        path_stream,
        auto_group,
        is_playground,
        body,
    } = request;

    let model_name = match path_model {
        Some(model) => model,
        None => body
            .get("model")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| RelayError::invalid_request("'model' field must be a string"))?,
    };

    let mut info = RelayInfo::new(&token, &user, auto_group, dialect, relay_mode);
    info.origin_model_name = model_name;
    info.is_playground = is_playground;
    info.is_stream = path_stream.unwrap_or_else(|| {
        body.get("stream").and_then(Value::as_bool).unwrap_or(false)
    });
    info.prompt_tokens_estimate = tokenizer::estimate_prompt_tokens(&body);

    let max_tokens = ["max_tokens", "max_output_tokens", "max_completion_tokens"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_i64))
        .unwrap_or(0);

    let prompt_tokens_estimate = info.prompt_tokens_estimate as i64;
    let price_data =
        pricing::model_price_helper(&mut info, prompt_tokens_estimate, max_tokens)?;

    let settings = settings::snapshot();
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| RelayError::internal(format!("failed to build HTTP client: {}", e)))?;

    let mut excluded: Vec<i64> = Vec::new();
    let mut last_error: Option<RelayError> = None;
    let max_attempts = settings.retry_times.max(1);

    for attempt in 0..max_attempts {
        // RESOLVE
        let candidates =
            Ability::get_candidates(&info.using_group, &info.origin_model_name, &excluded)
                .map_err(|e| RelayError::internal(format!("ability scan failed: {:?}", e)))?;
        let channel_id = match select::pick_channel(&candidates, &mut rand::rng()) {
            Some(channel_id) => channel_id,
            None => {
                // Out of channels: surface the upstream fault that burned the
                // previous one, or NO_CHANNEL when there never was any.
                return Err(last_error.unwrap_or_else(|| {
                    RelayError::no_channel(&info.using_group, &info.origin_model_name)
                }));
            }
        };
        let channel = match Channel::get_by_id(channel_id) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("picked channel {} unreadable: {:?}", channel_id, e);
                excluded.push(channel_id);
                continue;
            }
        };
        let channel_type = channel.adapter_type().ok_or_else(|| {
            RelayError::internal(format!("channel {} has unknown type", channel.id))
        })?;
        info.channel_id = channel.id;
        info.upstream_model_name = channel.resolve_upstream_model(&info.origin_model_name);
        debug!(
            "attempt {}: relaying {} as {} via channel {} ({})",
            attempt, info.origin_model_name, info.upstream_model_name, channel.id, channel.name
        );

        // PRE_CHARGE
        ledger::pre_consume_quota(&mut info, price_data.quota_to_pre_consume)?;

        // ADAPT
        let mut adaptor = adapter::for_channel_type(channel_type);
        adaptor.init(&info);
        let prepared = prepare_outbound(adaptor.as_ref(), &info, &channel, body.clone());
        let (url, headers, outbound_body) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                ledger::refund_pre_consumed(&mut info);
                return Err(e);
            }
        };

        // CALL
        let timeout = if info.is_stream {
            STREAM_TIMEOUT
        } else {
            UNARY_TIMEOUT
        };
        let response = match adaptor
            .do_request(&client, &url, headers, outbound_body, timeout)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                ledger::refund_pre_consumed(&mut info);
                error!("channel {} transport failure: {}", channel.id, e);
                excluded.push(channel.id);
                last_error = Some(e);
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let upstream_body = response.text().await.unwrap_or_default();
            let e = RelayError::upstream_status(
                status.as_u16(),
                extract_upstream_message(&upstream_body, status.as_u16()),
            );
            ledger::refund_pre_consumed(&mut info);
            if e.should_disable_channel(&settings) {
                auto_disable_channel(&channel, status.as_u16());
            }
            if e.is_retryable(&settings) {
                warn!(
                    "channel {} answered {}, retrying on another channel",
                    channel.id, status
                );
                excluded.push(channel.id);
                last_error = Some(e);
                continue;
            }
            return Err(e);
        }

        // STREAM / POST_CHARGE / LOG
        let native_dialect = adaptor.native_dialect(&info);
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("text/event-stream"))
            .unwrap_or(false);
        info.is_stream = info.is_stream || is_sse;

        return if is_sse {
            Ok(handle_streaming_response(response, info, native_dialect))
        } else {
            handle_unary_response(response, info, native_dialect).await
        };
    }

    Err(last_error
        .unwrap_or_else(|| RelayError::no_channel(&info.using_group, &info.origin_model_name)))
}

fn prepare_outbound(
    adaptor: &dyn Adaptor,
    info: &RelayInfo,
    channel: &Channel,
    body: Value,
) -> Result<(String, HeaderMap, String), RelayError> {
    let url = adaptor.request_url(info, channel)?;
    let mut headers = HeaderMap::new();
    adaptor.setup_headers(&mut headers, info, channel)?;
    let converted = adaptor.convert_request(info, body)?;
    let serialized = serde_json::to_string(&converted)
        .map_err(|e| RelayError::internal(format!("failed to serialize outbound body: {}", e)))?;
    Ok((url, headers, serialized))
}

fn auto_disable_channel(channel: &Channel, status: u16) {
    let reason = format!("auto disabled: upstream answered status {}", status);
    match Channel::update_status(channel.id, CHANNEL_STATUS_AUTO_DISABLED, &reason) {
        Ok(true) => log_info!("channel {} auto-disabled ({})", channel.id, reason),
        Ok(false) => warn!("channel {} vanished before auto-disable", channel.id),
        Err(e) => error!("failed to auto-disable channel {}: {:?}", channel.id, e),
    }
}

/// Copies upstream headers onto the client response, dropping the hop-by-hop
/// and length-bearing ones the relay invalidates.
fn copy_response_headers(source: &HeaderMap, target: &mut HeaderMap) {
    const DROPPED: [&str; 10] = [
        "content-length",
        "content-encoding",
        "transfer-encoding",
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "upgrade",
    ];
    for (name, value) in source {
        if !DROPPED.contains(&name.as_str()) {
            target.insert(name.clone(), value.clone());
        }
    }
}

async fn handle_unary_response(
    response: reqwest::Response,
    info: RelayInfo,
    native_dialect: ApiDialect,
) -> Result<Response, RelayError> {
    let upstream_headers = response.headers().clone();
    let is_gzip = upstream_headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("gzip"))
        .unwrap_or(false);

    let body_bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            // The pre-charge is already committed; reconcile through the
            // zero-token path so the ledger and the log both see this one.
            ledger::finalize_request(&info, &UsageInfo::default());
            return Err(RelayError::upstream_transport(format!(
                "failed to read upstream body: {}",
                e
            )));
        }
    };
    let body_bytes = if is_gzip {
        decompress_gzip(body_bytes)
    } else {
        body_bytes
    };

    let parsed: Value = match serde_json::from_slice(&body_bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            ledger::finalize_request(&info, &UsageInfo::default());
            return Err(RelayError::upstream_malformed(format!(
                "upstream reply is not valid JSON: {}",
                e
            )));
        }
    };

    let usage = parse_usage_info(&parsed, native_dialect).unwrap_or_default();
    let translated = transform_result(parsed, native_dialect, info.dialect);
    ledger::finalize_request(&info, &usage);

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(headers) = builder.headers_mut() {
        copy_response_headers(&upstream_headers, headers);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    builder
        .body(Body::from(translated.to_string()))
        .map_err(|e| RelayError::internal(format!("failed to build response: {}", e)))
}

fn decompress_gzip(body: Bytes) -> Bytes {
    if body.is_empty() {
        return body;
    }
    let mut decoder = GzDecoder::new(&body[..]);
    let mut decompressed = Vec::new();
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => Bytes::from(decompressed),
        Err(e) => {
            error!("gzip decode failed, forwarding raw body: {}", e);
            body
        }
    }
}

/// Streams the upstream reply to the client, re-framed into the inbound
/// dialect, flushing every chunk. The pump task owns usage accumulation and
/// the final ledger reconciliation, so a client disconnect never skips
/// POST_CHARGE: the pump drains the upstream a few seconds longer to catch
/// the trailing usage block, then reconciles.
fn handle_streaming_response(
    response: reqwest::Response,
    info: RelayInfo,
    native_dialect: ApiDialect,
) -> Response {
    let upstream_headers = response.headers().clone();
    let inbound_dialect = info.dialect;
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);

    tokio::spawn(async move {
        let mut parser = SseParser::new();
        let mut transformer = StreamTransformer::new(native_dialect, inbound_dialect);
        let mut accumulator = UsageAccumulator::new(native_dialect, info.prompt_tokens_estimate);
        let mut stream = response.bytes_stream();
        let mut client_gone_since: Option<Instant> = None;

        loop {
            // After a client disconnect the upstream is only drained long
            // enough to catch the trailing usage block.
            let next = match client_gone_since {
                Some(gone_since) => {
                    let remaining = DISCONNECT_DRAIN.saturating_sub(gone_since.elapsed());
                    if remaining.is_zero() {
                        warn!("client gone and drain window elapsed, abandoning upstream read");
                        break;
                    }
                    match tokio::time::timeout(remaining, stream.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!("client gone and drain window elapsed, abandoning upstream read");
                            break;
                        }
                    }
                }
                None => stream.next().await,
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    error!("upstream stream error: {}", e);
                    // Already mid-stream: the failure is a terminal event,
                    // not a status change.
                    let terminal = RelayError::upstream_transport(format!("stream error: {}", e))
                        .to_json(inbound_dialect);
                    let event = crate::utils::sse::SseEvent::named("error", terminal.to_string());
                    let _ = tx.send(Ok(Bytes::from(event.to_bytes().freeze()))).await;
                    break;
                }
                None => break,
            };
            for event in parser.process(&chunk) {
                if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
                    accumulator.observe(&value);
                }
                if client_gone_since.is_some() {
                    continue;
                }
                for out in transformer.transform_event(event) {
                    if tx.send(Ok(out.to_bytes().freeze())).await.is_err() {
                        debug!("client disconnected mid-stream, draining for usage");
                        client_gone_since = Some(Instant::now());
                        break;
                    }
                }
            }
        }

        if client_gone_since.is_none() {
            for out in transformer.finish() {
                if tx.send(Ok(out.to_bytes().freeze())).await.is_err() {
                    break;
                }
            }
        }
        drop(tx);

        let usage = accumulator.finish();
        ledger::finalize_request(&info, &usage);
    });

    let body_stream = async_stream::stream! {
        let mut rx = rx;
        while let Some(item) = rx.recv().await {
            yield item;
        }
    };

    let mut builder = Response::builder().status(StatusCode::OK);
    if let Some(headers) = builder.headers_mut() {
        copy_response_headers(&upstream_headers, headers);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    }
    builder
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|e| {
            error!("failed to build streaming response: {}", e);
            Response::new(Body::empty())
        })
}

/// Digs a human-readable message out of an upstream error body.
fn extract_upstream_message(body: &str, status: u16) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        for path in [
            &["error", "message"][..],
            &["message"][..],
            &["error", "msg"][..],
        ] {
            let mut current = &parsed;
            let mut found = true;
            for key in path {
                match current.get(key) {
                    Some(next) => current = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                if let Some(message) = current.as_str() {
                    return format!("upstream answered status {}: {}", status, message);
                }
            }
        }
    }
    let trimmed: String = body.chars().take(256).collect();
    if trimmed.is_empty() {
        format!("upstream answered status {}", status)
    } else {
        format!("upstream answered status {}: {}", status, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_messages_are_extracted_from_error_envelopes() {
        let body = r#"{"error": {"message": "invalid api key", "type": "auth"}}"#;
        let message = extract_upstream_message(body, 401);
        assert!(message.contains("invalid api key"));
        assert!(message.contains("401"));
    }

    #[test]
    fn raw_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let message = extract_upstream_message(&body, 500);
        assert!(message.len() < 300);
    }

    #[test]
    fn empty_error_bodies_still_name_the_status() {
        assert_eq!(
            extract_upstream_message("", 503),
            "upstream answered status 503"
        );
    }
}
