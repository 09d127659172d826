use async_trait::async_trait;
use axum::http::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    HeaderMap,
};
use serde_json::{json, Value};

use super::Adaptor;
use crate::database::channel::Channel;
use crate::relay::error::RelayError;
use crate::relay::info::RelayInfo;
use crate::schema::enum_def::{ApiDialect, RelayMode};
use crate::service::transform::transform_request_data;
use crate::utils::process_stream_options;

#[derive(Debug, Default)]
pub struct OpenAiAdaptor {
    is_stream: bool,
}

#[async_trait]
impl Adaptor for OpenAiAdaptor {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn init(&mut self, info: &RelayInfo) {
        self.is_stream = info.is_stream;
    }

    fn native_dialect(&self, info: &RelayInfo) -> ApiDialect {
        match info.relay_mode {
            RelayMode::Responses => ApiDialect::OpenAiResponses,
            _ => ApiDialect::OpenAiChat,
        }
    }

    fn request_url(&self, info: &RelayInfo, channel: &Channel) -> Result<String, RelayError> {
        let path = match info.relay_mode {
            RelayMode::Chat => "/v1/chat/completions",
            RelayMode::Responses => "/v1/responses",
            RelayMode::Embeddings => "/v1/embeddings",
            RelayMode::Rerank => "/v1/rerank",
            RelayMode::Image => "/v1/images/generations",
            RelayMode::Audio => "/v1/audio/speech",
        };
        Ok(format!("{}{}", channel.effective_base_url(), path))
    }

    fn setup_headers(
        &self,
        headers: &mut HeaderMap,
        _info: &RelayInfo,
        channel: &Channel,
    ) -> Result<(), RelayError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", channel.key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::try_from(bearer)
                .map_err(|_| RelayError::internal("channel key is not a valid header value"))?,
        );
        Ok(())
    }

    fn convert_request(&self, info: &RelayInfo, body: Value) -> Result<Value, RelayError> {
        let mut data = match info.relay_mode {
            // Utility payloads relay as-is apart from the model remap.
            RelayMode::Embeddings | RelayMode::Rerank | RelayMode::Image | RelayMode::Audio => {
                body
            }
            _ => transform_request_data(
                body,
                info.dialect,
                self.native_dialect(info),
                self.is_stream,
            ),
        };
        if let Some(object) = data.as_object_mut() {
            object.insert("model".to_string(), json!(info.upstream_model_name));
        }
        process_stream_options(&mut data);
        Ok(data)
    }
}
