use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::error;

use crate::config::CONFIG;
use crate::controller::{ApiError, ApiOk};
use crate::database::token::Token;

/// The admin test harness: replays a stored credential against the public
/// relay surface over loopback and pipes the SSE reply to the browser.

#[derive(Debug, Serialize)]
pub struct ModelTestToken {
    pub id: i64,
    pub name: String,
    pub group: String,
    pub status: i32,
    pub user_id: i64,
}

/// GET /api/model_test/tokens
pub async fn get_model_test_tokens() -> Result<Json<ApiOk<Vec<ModelTestToken>>>, ApiError> {
    let tokens = Token::list_all()?;
    let response = tokens
        .into_iter()
        .map(|token| ModelTestToken {
            id: token.id,
            name: token.name,
            group: token.group_name.unwrap_or_default(),
            status: token.status,
            user_id: token.user_id,
        })
        .collect();
    Ok(Json(ApiOk::data(response)))
}

#[derive(Debug, Deserialize)]
pub struct ModelTestProxyRequest {
    pub token_id: i64,
    /// Forwarded byte-for-byte; the harness never reshapes the payload.
    pub payload: Box<RawValue>,
}

pub async fn proxy_model_test_chat_completions(
    Json(request): Json<ModelTestProxyRequest>,
) -> Response {
    proxy_model_test(request, "/v1/chat/completions", false).await
}

pub async fn proxy_model_test_responses(Json(request): Json<ModelTestProxyRequest>) -> Response {
    proxy_model_test(request, "/v1/responses", false).await
}

pub async fn proxy_model_test_messages(Json(request): Json<ModelTestProxyRequest>) -> Response {
    proxy_model_test(request, "/v1/messages", true).await
}

async fn proxy_model_test(
    request: ModelTestProxyRequest,
    target_path: &str,
    claude_headers: bool,
) -> Response {
    match proxy_model_test_inner(request, target_path, claude_headers).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn proxy_model_test_inner(
    request: ModelTestProxyRequest,
    target_path: &str,
    claude_headers: bool,
) -> Result<Response, ApiError> {
    if request.token_id == 0 || request.payload.get().is_empty() {
        return Err(ApiError::ParamInvalid(Some("invalid params".to_string())));
    }

    let token = Token::get_by_id(request.token_id)?;
    if !token.is_enabled() {
        return Err(ApiError::ParamInvalid(Some(
            "token is not enabled".to_string(),
        )));
    }

    let target_url = format!("http://127.0.0.1:{}{}", CONFIG.port, target_path);
    let mut upstream = reqwest::Client::new()
        .post(&target_url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer sk-{}", token.key))
        .header("Accept", "text/event-stream")
        .header("Cache-Control", "no-cache");
    if claude_headers {
        upstream = upstream
            .header("x-api-key", format!("sk-{}", token.key))
            .header("anthropic-version", "2023-06-01");
    }

    let response = upstream
        .body(request.payload.get().to_string())
        .send()
        .await
        .map_err(|e| {
            error!("model test loopback request failed: {}", e);
            ApiError::Internal(Some(format!("loopback request failed: {}", e)))
        })?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    copy_test_proxy_headers(response.headers(), &mut headers);
    headers.insert("x-accel-buffering", "no".parse().unwrap());

    // Chunk-by-chunk copy: each upstream chunk becomes one body frame, so the
    // admin browser sees events as they happen.
    let body = Body::from_stream(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string()))),
    );

    let mut builder = Response::builder().status(status);
    if let Some(target) = builder.headers_mut() {
        *target = headers;
    }
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(Some(format!("failed to build response: {}", e))))
}

fn copy_test_proxy_headers(source: &HeaderMap, target: &mut HeaderMap) {
    const HOP_BY_HOP: [&str; 8] = [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
    ];
    for (name, value) in source {
        let name_str = name.as_str();
        if name_str == "content-length" || HOP_BY_HOP.contains(&name_str) {
            continue;
        }
        if let Ok(header_name) = HeaderName::try_from(name_str) {
            target.insert(header_name, value.clone());
        }
    }
}
