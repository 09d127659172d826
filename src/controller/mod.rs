use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Router,
};

mod channel;
mod error;
mod log;
mod mapping;
mod model_test;
mod token;

pub use error::{ApiError, ApiOk};

/// The admin API surface. Session/admin authentication middleware sits in
/// front of this router and is not part of the core.
pub fn create_api_router() -> Router {
    let mapping_router = Router::new()
        .route("/", get(mapping::get_mappings))
        .route("/ability", patch(mapping::update_mapping_ability))
        .route(
            "/ability_enabled",
            patch(mapping::update_mapping_ability_enabled),
        )
        .route("/channel_mapping", patch(mapping::update_channel_mapping))
        .route(
            "/channel_status",
            patch(mapping::update_mapping_channel_status),
        );

    let model_test_router = Router::new()
        .route("/tokens", get(model_test::get_model_test_tokens))
        .route(
            "/chat/completions",
            post(model_test::proxy_model_test_chat_completions),
        )
        .route("/responses", post(model_test::proxy_model_test_responses))
        .route("/messages", post(model_test::proxy_model_test_messages));

    let channel_router = Router::new()
        .route("/", get(channel::list_channels))
        .route("/", post(channel::create_channel))
        .route("/", put(channel::update_channel))
        .route("/{id}", delete(channel::delete_channel))
        .route("/{id}/models", get(channel::list_channel_models))
        .route("/fix", post(channel::fix_channel_abilities));

    let token_router = Router::new()
        .route("/", get(token::list_tokens))
        .route("/", post(token::create_token))
        .route("/", put(token::update_token))
        .route("/{id}", delete(token::delete_token));

    let log_router = Router::new().route("/", get(log::list_logs));

    Router::new().nest(
        "/api",
        Router::new()
            .nest("/mapping", mapping_router)
            .nest("/model_test", model_test_router)
            .nest("/channel", channel_router)
            .nest("/token", token_router)
            .nest("/log", log_router),
    )
}

pub async fn handle_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
