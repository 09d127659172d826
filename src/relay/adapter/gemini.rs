use async_trait::async_trait;
use axum::http::{
    header::{HeaderValue, CONTENT_TYPE},
    HeaderMap,
};
use serde_json::Value;

use super::Adaptor;
use crate::database::channel::Channel;
use crate::relay::error::RelayError;
use crate::relay::info::RelayInfo;
use crate::schema::enum_def::{ApiDialect, RelayMode};
use crate::service::transform::transform_request_data;

#[derive(Debug, Default)]
pub struct GeminiAdaptor {
    is_stream: bool,
}

#[async_trait]
impl Adaptor for GeminiAdaptor {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn init(&mut self, info: &RelayInfo) {
        self.is_stream = info.is_stream;
    }

    fn native_dialect(&self, _info: &RelayInfo) -> ApiDialect {
        ApiDialect::GeminiGenerate
    }

    fn request_url(&self, info: &RelayInfo, channel: &Channel) -> Result<String, RelayError> {
        match info.relay_mode {
            RelayMode::Chat | RelayMode::Responses => {}
            _ => {
                return Err(RelayError::invalid_request(
                    "this model's channel only serves chat requests",
                ))
            }
        }
        // Streaming replies are requested in SSE framing; unary ones as one
        // JSON document.
        let action = if self.is_stream {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        Ok(format!(
            "{}/v1beta/models/{}:{}",
            channel.effective_base_url(),
            info.upstream_model_name,
            action
        ))
    }

    fn setup_headers(
        &self,
        headers: &mut HeaderMap,
        _info: &RelayInfo,
        channel: &Channel,
    ) -> Result<(), RelayError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::try_from(channel.key.clone())
                .map_err(|_| RelayError::internal("channel key is not a valid header value"))?,
        );
        Ok(())
    }

    fn convert_request(&self, info: &RelayInfo, body: Value) -> Result<Value, RelayError> {
        // The model travels in the URL, not the body.
        Ok(transform_request_data(
            body,
            info.dialect,
            ApiDialect::GeminiGenerate,
            self.is_stream,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::token::Token;
    use crate::database::user::User;
    use crate::schema::enum_def::{ChannelType, TOKEN_STATUS_ENABLED, USER_STATUS_ENABLED};

    fn test_info(is_stream: bool) -> RelayInfo {
        let token = Token {
            id: 1,
            user_id: 1,
            key: "k".to_string(),
            name: "t".to_string(),
            status: TOKEN_STATUS_ENABLED,
            remain_quota: 0,
            unlimited_quota: true,
            group_name: None,
            created_at: 0,
            accessed_at: 0,
        };
        let user = User {
            id: 1,
            username: "u".to_string(),
            status: USER_STATUS_ENABLED,
            quota: 0,
            used_quota: 0,
            request_count: 0,
            group_name: "default".to_string(),
            notify_type: "email".to_string(),
            quota_warning_threshold: 0,
            accept_unset_model_price: true,
        };
        let mut info = RelayInfo::new(
            &token,
            &user,
            None,
            ApiDialect::OpenAiChat,
            RelayMode::Chat,
        );
        info.upstream_model_name = "gemini-pro".to_string();
        info.is_stream = is_stream;
        info
    }

    fn test_channel() -> Channel {
        Channel {
            id: 1,
            name: "g".to_string(),
            channel_type: ChannelType::Gemini.as_i32(),
            status: 1,
            key: "secret".to_string(),
            base_url: None,
            models: "gemini-pro".to_string(),
            group_names: "default".to_string(),
            model_mapping: None,
            tag: None,
            priority: 0,
            weight: 0,
            used_quota: 0,
            status_reason: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn url_picks_action_by_stream_mode() {
        let mut adaptor = GeminiAdaptor::default();
        let unary = test_info(false);
        adaptor.init(&unary);
        let url = adaptor.request_url(&unary, &test_channel()).unwrap();
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
        let streaming = test_info(true);
        adaptor.init(&streaming);
        let url = adaptor.request_url(&streaming, &test_channel()).unwrap();
        assert!(url.ends_with("gemini-pro:streamGenerateContent?alt=sse"));
    }

    #[test]
    fn auth_header_is_goog_api_key() {
        let adaptor = GeminiAdaptor::default();
        let mut headers = HeaderMap::new();
        adaptor
            .setup_headers(&mut headers, &test_info(false), &test_channel())
            .unwrap();
        assert_eq!(headers.get("x-goog-api-key").unwrap(), "secret");
    }
}
