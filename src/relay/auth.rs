use std::collections::HashMap;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::warn;

use crate::database::token::Token;
use crate::database::user::User;
use crate::relay::error::RelayError;
use crate::schema::enum_def::USER_STATUS_ENABLED;

const BEARER_PREFIX: &str = "Bearer ";
const KEY_PREFIX: &str = "sk-";

/// Pulls the token key out of a request. Accepts the OpenAI bearer form, the
/// Claude `x-api-key` header, the Gemini `x-goog-api-key` header, and the
/// `key` query parameter, in that order. The `sk-` prefix is stripped; the
/// stored key never carries it.
pub fn parse_token_key(
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<String, RelayError> {
    if let Some(auth_header) = headers.get(AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix(BEARER_PREFIX) {
                if !token.is_empty() {
                    return Ok(strip_key_prefix(token));
                }
            }
        }
    }
    for header_name in ["x-api-key", "x-goog-api-key"] {
        if let Some(value) = headers.get(header_name) {
            if let Ok(key) = value.to_str() {
                if !key.is_empty() {
                    return Ok(strip_key_prefix(key));
                }
            }
        }
    }
    if let Some(key) = params.get("key") {
        if !key.is_empty() {
            return Ok(strip_key_prefix(key));
        }
    }
    Err(RelayError::invalid_request(
        "missing API key; provide it as 'Authorization: Bearer sk-...', 'x-api-key', \
         'x-goog-api-key', or the 'key' query parameter",
    ))
}

fn strip_key_prefix(key: &str) -> String {
    key.strip_prefix(KEY_PREFIX).unwrap_or(key).to_string()
}

/// Loads and checks the credential pair. Disabled tokens and users fail as
/// invalid requests without disclosing which half rejected.
pub fn authenticate(
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> Result<(Token, User), RelayError> {
    let key = parse_token_key(headers, params)?;
    let token = Token::get_by_key(&key)
        .map_err(|e| RelayError::internal(format!("token lookup failed: {:?}", e)))?
        .ok_or_else(|| RelayError::invalid_request("invalid API key"))?;
    if !token.is_enabled() {
        warn!("rejected disabled token {}", token.id);
        return Err(RelayError::invalid_request("invalid API key"));
    }
    let user = User::get_by_id(token.user_id)
        .map_err(|e| RelayError::internal(format!("user lookup failed: {:?}", e)))?;
    if user.status != USER_STATUS_ENABLED {
        warn!("rejected token {} of disabled user {}", token.id, user.id);
        return Err(RelayError::invalid_request("invalid API key"));
    }
    Ok((token, user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_key_wins_and_prefix_is_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer sk-abc123"));
        headers.insert("x-api-key", HeaderValue::from_static("sk-other"));
        let key = parse_token_key(&headers, &HashMap::new()).unwrap();
        assert_eq!(key, "abc123");
    }

    #[test]
    fn x_api_key_and_query_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("sk-claude-key"));
        assert_eq!(
            parse_token_key(&headers, &HashMap::new()).unwrap(),
            "claude-key"
        );

        let mut params = HashMap::new();
        params.insert("key".to_string(), "plainkey".to_string());
        assert_eq!(
            parse_token_key(&HeaderMap::new(), &params).unwrap(),
            "plainkey"
        );
    }

    #[test]
    fn missing_key_is_an_invalid_request() {
        let err = parse_token_key(&HeaderMap::new(), &HashMap::new()).unwrap_err();
        assert!(err.message.contains("missing API key"));
    }
}
