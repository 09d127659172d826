use async_trait::async_trait;
use axum::http::{
    header::{HeaderValue, CONTENT_TYPE},
    HeaderMap,
};
use serde_json::{json, Value};

use super::Adaptor;
use crate::database::channel::Channel;
use crate::relay::error::RelayError;
use crate::relay::info::RelayInfo;
use crate::schema::enum_def::{ApiDialect, RelayMode};
use crate::service::transform::transform_request_data;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Default)]
pub struct ClaudeAdaptor {
    is_stream: bool,
}

#[async_trait]
impl Adaptor for ClaudeAdaptor {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn init(&mut self, info: &RelayInfo) {
        self.is_stream = info.is_stream;
    }

    fn native_dialect(&self, _info: &RelayInfo) -> ApiDialect {
        ApiDialect::ClaudeMessages
    }

    fn request_url(&self, info: &RelayInfo, channel: &Channel) -> Result<String, RelayError> {
        match info.relay_mode {
            RelayMode::Chat | RelayMode::Responses => {
                Ok(format!("{}/v1/messages", channel.effective_base_url()))
            }
            _ => Err(RelayError::invalid_request(
                "this model's channel only serves chat requests",
            )),
        }
    }

    fn setup_headers(
        &self,
        headers: &mut HeaderMap,
        _info: &RelayInfo,
        channel: &Channel,
    ) -> Result<(), RelayError> {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::try_from(channel.key.clone())
                .map_err(|_| RelayError::internal("channel key is not a valid header value"))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(())
    }

    fn convert_request(&self, info: &RelayInfo, body: Value) -> Result<Value, RelayError> {
        let mut data = transform_request_data(
            body,
            info.dialect,
            ApiDialect::ClaudeMessages,
            self.is_stream,
        );
        if let Some(object) = data.as_object_mut() {
            object.insert("model".to_string(), json!(info.upstream_model_name));
            if self.is_stream {
                object.insert("stream".to_string(), json!(true));
            }
        }
        Ok(data)
    }
}
