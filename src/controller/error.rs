use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

/// Admin-surface failure. Domain errors still answer HTTP 200; the envelope's
/// `success` flag carries the outcome.
#[derive(Debug)]
pub enum ApiError {
    ParamInvalid(Option<String>),
    NotFound(Option<String>),
    DatabaseFatal(Option<String>),
    Internal(Option<String>),
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => ApiError::NotFound(None),
            _ => ApiError::DatabaseFatal(Some(err.to_string())),
        }
    }
}

impl ApiError {
    fn message(&self) -> String {
        match self {
            ApiError::ParamInvalid(msg) => msg
                .clone()
                .unwrap_or_else(|| "request params invalid".to_string()),
            ApiError::NotFound(msg) => msg.clone().unwrap_or_else(|| "data not found".to_string()),
            ApiError::DatabaseFatal(msg) => {
                msg.clone().unwrap_or_else(|| "database error".to_string())
            }
            ApiError::Internal(msg) => msg
                .clone()
                .unwrap_or_else(|| "internal server error".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "message": self.message(),
        }));
        body.into_response()
    }
}

/// The `{ success, message, data? }` envelope every admin endpoint answers with.
#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiOk<T> {
    pub fn data(data: T) -> ApiOk<T> {
        ApiOk {
            success: true,
            message: "".to_string(),
            data: Some(data),
        }
    }
}

impl ApiOk<()> {
    pub fn empty() -> ApiOk<()> {
        ApiOk {
            success: true,
            message: "".to_string(),
            data: None,
        }
    }
}

impl<T> IntoResponse for ApiOk<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
