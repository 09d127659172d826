use axum::{extract::Path, Json};
use serde::Deserialize;

use crate::controller::{ApiError, ApiOk};
use crate::database::token::{NewTokenPayload, Token, UpdateTokenData};

/// GET /api/token/
pub async fn list_tokens() -> Result<Json<ApiOk<Vec<Token>>>, ApiError> {
    Ok(Json(ApiOk::data(Token::list_all()?)))
}

/// POST /api/token/
pub async fn create_token(
    Json(payload): Json<NewTokenPayload>,
) -> Result<Json<ApiOk<Token>>, ApiError> {
    if payload.user_id == 0 || payload.key.is_empty() {
        return Err(ApiError::ParamInvalid(Some(
            "user_id and key are required".to_string(),
        )));
    }
    Ok(Json(ApiOk::data(Token::create(&payload)?)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTokenRequest {
    pub id: i64,
    #[serde(flatten)]
    pub data: UpdateTokenData,
}

/// PUT /api/token/
pub async fn update_token(
    Json(request): Json<UpdateTokenRequest>,
) -> Result<Json<ApiOk<Token>>, ApiError> {
    if request.id == 0 {
        return Err(ApiError::ParamInvalid(Some("invalid id".to_string())));
    }
    Ok(Json(ApiOk::data(Token::update(request.id, &request.data)?)))
}

/// DELETE /api/token/{id}
pub async fn delete_token(Path(id): Path<i64>) -> Result<ApiOk<()>, ApiError> {
    Token::delete(id)?;
    Ok(ApiOk::empty())
}
