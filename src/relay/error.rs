use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::schema::enum_def::ApiDialect;
use crate::service::settings::Settings;

/// What went wrong with a relayed request. Each kind implies a client-facing
/// status and whether the dispatcher may try another channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayErrorKind {
    InvalidRequest,
    NoChannel,
    ModelNotPriced,
    InsufficientQuota,
    UpstreamTransport,
    UpstreamStatus(u16),
    UpstreamMalformed,
    Internal,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RelayError {
    pub kind: RelayErrorKind,
    pub message: String,
}

impl RelayError {
    pub fn invalid_request(message: impl Into<String>) -> RelayError {
        RelayError {
            kind: RelayErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn no_channel(group: &str, model: &str) -> RelayError {
        RelayError {
            kind: RelayErrorKind::NoChannel,
            message: format!("no available channel for group {} and model {}", group, model),
        }
    }

    pub fn model_not_priced(model: &str) -> RelayError {
        RelayError {
            kind: RelayErrorKind::ModelNotPriced,
            message: format!("model {} has no configured price", model),
        }
    }

    pub fn insufficient_quota(message: impl Into<String>) -> RelayError {
        RelayError {
            kind: RelayErrorKind::InsufficientQuota,
            message: message.into(),
        }
    }

    pub fn upstream_transport(message: impl Into<String>) -> RelayError {
        RelayError {
            kind: RelayErrorKind::UpstreamTransport,
            message: message.into(),
        }
    }

    pub fn upstream_status(status: u16, message: impl Into<String>) -> RelayError {
        RelayError {
            kind: RelayErrorKind::UpstreamStatus(status),
            message: message.into(),
        }
    }

    pub fn upstream_malformed(message: impl Into<String>) -> RelayError {
        RelayError {
            kind: RelayErrorKind::UpstreamMalformed,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> RelayError {
        RelayError {
            kind: RelayErrorKind::Internal,
            message: message.into(),
        }
    }

    /// Whether the dispatcher may refund and re-resolve on another channel.
    pub fn is_retryable(&self, settings: &Settings) -> bool {
        match &self.kind {
            RelayErrorKind::UpstreamTransport => true,
            RelayErrorKind::UpstreamStatus(status) => {
                settings.automatic_retry_status_codes.contains(*status)
                    || settings.automatic_disable_status_codes.contains(*status)
            }
            _ => false,
        }
    }

    /// Whether the failing channel should be auto-disabled before the retry.
    pub fn should_disable_channel(&self, settings: &Settings) -> bool {
        match &self.kind {
            RelayErrorKind::UpstreamStatus(status) => {
                settings.automatic_disable_status_codes.contains(*status)
            }
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            RelayErrorKind::InvalidRequest | RelayErrorKind::ModelNotPriced => {
                StatusCode::BAD_REQUEST
            }
            RelayErrorKind::NoChannel => StatusCode::SERVICE_UNAVAILABLE,
            RelayErrorKind::InsufficientQuota => StatusCode::FORBIDDEN,
            RelayErrorKind::UpstreamTransport | RelayErrorKind::UpstreamMalformed => {
                StatusCode::BAD_GATEWAY
            }
            RelayErrorKind::UpstreamStatus(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn type_label(&self) -> &'static str {
        match &self.kind {
            RelayErrorKind::InvalidRequest => "invalid_request_error",
            RelayErrorKind::NoChannel => "no_channel_error",
            RelayErrorKind::ModelNotPriced => "model_not_priced_error",
            RelayErrorKind::InsufficientQuota => "insufficient_quota",
            RelayErrorKind::UpstreamTransport
            | RelayErrorKind::UpstreamStatus(_)
            | RelayErrorKind::UpstreamMalformed => "upstream_error",
            RelayErrorKind::Internal => "internal_error",
        }
    }

    /// The surfaced message. Internal faults stay opaque.
    fn public_message(&self) -> String {
        match &self.kind {
            RelayErrorKind::Internal => "internal error".to_string(),
            _ => self.message.clone(),
        }
    }

    /// The error body in the inbound dialect's envelope.
    pub fn to_json(&self, dialect: ApiDialect) -> Value {
        match dialect {
            ApiDialect::ClaudeMessages => json!({
                "type": "error",
                "error": {
                    "type": self.type_label(),
                    "message": self.public_message(),
                }
            }),
            ApiDialect::GeminiGenerate => json!({
                "error": {
                    "code": self.status_code().as_u16(),
                    "message": self.public_message(),
                    "status": self.type_label(),
                }
            }),
            _ => json!({
                "error": {
                    "message": self.public_message(),
                    "type": self.type_label(),
                    "code": null,
                }
            }),
        }
    }

    pub fn into_response(self, dialect: ApiDialect) -> Response {
        (self.status_code(), Json(self.to_json(dialect))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::settings::StatusCodeSet;

    fn settings_with(retry: &str, disable: &str) -> Settings {
        Settings {
            automatic_retry_status_codes: StatusCodeSet::parse(retry),
            automatic_disable_status_codes: StatusCodeSet::parse(disable),
            ..Settings::default()
        }
    }

    #[test]
    fn transport_errors_are_retryable() {
        let settings = settings_with("", "");
        assert!(RelayError::upstream_transport("dial failed").is_retryable(&settings));
        assert!(!RelayError::invalid_request("bad").is_retryable(&settings));
        assert!(!RelayError::insufficient_quota("broke").is_retryable(&settings));
    }

    #[test]
    fn status_errors_follow_the_configured_sets() {
        let settings = settings_with("429,500-504", "401");
        assert!(RelayError::upstream_status(429, "slow down").is_retryable(&settings));
        assert!(RelayError::upstream_status(503, "down").is_retryable(&settings));
        assert!(!RelayError::upstream_status(418, "teapot").is_retryable(&settings));
        // A disable-coded status both disables and retries.
        let unauthorized = RelayError::upstream_status(401, "bad key");
        assert!(unauthorized.should_disable_channel(&settings));
        assert!(unauthorized.is_retryable(&settings));
        assert!(!RelayError::upstream_status(429, "x").should_disable_channel(&settings));
    }

    #[test]
    fn envelopes_match_the_inbound_dialect() {
        let error = RelayError::no_channel("default", "gpt-x");
        let openai = error.to_json(ApiDialect::OpenAiChat);
        assert!(openai["error"]["message"]
            .as_str()
            .unwrap()
            .contains("gpt-x"));
        let claude = error.to_json(ApiDialect::ClaudeMessages);
        assert_eq!(claude["type"], "error");
        assert!(claude["error"]["message"].as_str().is_some());
        let gemini = error.to_json(ApiDialect::GeminiGenerate);
        assert_eq!(gemini["error"]["code"], 503);
    }

    #[test]
    fn internal_details_stay_opaque() {
        let error = RelayError::internal("sqlite exploded at row 42");
        let body = error.to_json(ApiDialect::OpenAiChat);
        assert_eq!(body["error"]["message"], "internal error");
    }

    #[test]
    fn upstream_status_passes_through() {
        let error = RelayError::upstream_status(429, "rate limited");
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }
}
