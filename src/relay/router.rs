use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::database::ability::Ability;
use crate::relay::auth::authenticate;
use crate::relay::dispatch::{relay, RelayRequest};
use crate::relay::error::RelayError;
use crate::schema::enum_def::{ApiDialect, RelayMode};

/// The public relay surface: the three fixed dialect paths, the OpenAI-shaped
/// utility endpoints, and the Gemini-shaped model-action route.
pub fn create_relay_router() -> Router {
    Router::new()
        .route(
            "/v1/chat/completions",
            post(|headers, query, body| {
                handle_relay(headers, query, body, ApiDialect::OpenAiChat, RelayMode::Chat)
            }),
        )
        .route(
            "/v1/responses",
            post(|headers, query, body| {
                handle_relay(
                    headers,
                    query,
                    body,
                    ApiDialect::OpenAiResponses,
                    RelayMode::Responses,
                )
            }),
        )
        .route(
            "/v1/messages",
            post(|headers, query, body| {
                handle_relay(
                    headers,
                    query,
                    body,
                    ApiDialect::ClaudeMessages,
                    RelayMode::Chat,
                )
            }),
        )
        .route(
            "/v1/embeddings",
            post(|headers, query, body| {
                handle_relay(
                    headers,
                    query,
                    body,
                    ApiDialect::OpenAiChat,
                    RelayMode::Embeddings,
                )
            }),
        )
        .route(
            "/v1/rerank",
            post(|headers, query, body| {
                handle_relay(
                    headers,
                    query,
                    body,
                    ApiDialect::OpenAiChat,
                    RelayMode::Rerank,
                )
            }),
        )
        .route(
            "/v1/images/generations",
            post(|headers, query, body| {
                handle_relay(headers, query, body, ApiDialect::OpenAiChat, RelayMode::Image)
            }),
        )
        .route(
            "/v1/audio/speech",
            post(|headers, query, body| {
                handle_relay(headers, query, body, ApiDialect::OpenAiChat, RelayMode::Audio)
            }),
        )
        .route("/v1/models", get(handle_list_models))
        .route("/v1beta/models/{model_action}", post(handle_gemini_relay))
}

async fn handle_relay(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
    dialect: ApiDialect,
    relay_mode: RelayMode,
) -> Response {
    let (token, user) = match authenticate(&headers, &params) {
        Ok(pair) => pair,
        Err(e) => return e.into_response(dialect),
    };
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            return RelayError::invalid_request(format!("request body is not valid JSON: {}", e))
                .into_response(dialect)
        }
    };
    relay(RelayRequest {
        token,
        user,
        dialect,
        relay_mode,
        path_model: None,
        path_stream: None,
        auto_group: None,
        is_playground: false,
        body,
    })
    .await
}

/// `/v1beta/models/{model}:{action}` with generateContent or
/// streamGenerateContent; the model rides in the path.
async fn handle_gemini_relay(
    Path(model_action): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let dialect = ApiDialect::GeminiGenerate;
    let (model, action) = match model_action.split_once(':') {
        Some(parts) => parts,
        None => {
            return RelayError::invalid_request(
                "expected path of the form models/{model}:{action}",
            )
            .into_response(dialect)
        }
    };
    let is_stream = match action {
        "generateContent" => false,
        "streamGenerateContent" => true,
        other => {
            return RelayError::invalid_request(format!("unsupported action '{}'", other))
                .into_response(dialect)
        }
    };

    let (token, user) = match authenticate(&headers, &params) {
        Ok(pair) => pair,
        Err(e) => return e.into_response(dialect),
    };
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            return RelayError::invalid_request(format!("request body is not valid JSON: {}", e))
                .into_response(dialect)
        }
    };
    relay(RelayRequest {
        token,
        user,
        dialect,
        relay_mode: RelayMode::Chat,
        path_model: Some(model.to_string()),
        path_stream: Some(is_stream),
        auto_group: None,
        is_playground: false,
        body,
    })
    .await
}

async fn handle_list_models(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let dialect = ApiDialect::OpenAiChat;
    let (token, user) = match authenticate(&headers, &params) {
        Ok(pair) => pair,
        Err(e) => return e.into_response(dialect),
    };
    let group = token
        .group_name
        .filter(|g| !g.is_empty())
        .unwrap_or(user.group_name);
    match Ability::list_models_for_group(&group) {
        Ok(models) => {
            let data: Vec<Value> = models
                .into_iter()
                .map(|model| {
                    json!({
                        "id": model,
                        "object": "model",
                        "owned_by": "relay-hub",
                    })
                })
                .collect();
            Json(json!({"object": "list", "data": data})).into_response()
        }
        Err(e) => RelayError::internal(format!("failed to list models: {:?}", e))
            .into_response(dialect),
    }
}
