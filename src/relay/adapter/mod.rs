use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;

use crate::database::channel::Channel;
use crate::relay::error::RelayError;
use crate::relay::info::RelayInfo;
use crate::schema::enum_def::{ApiDialect, ChannelType};

mod claude;
mod gemini;
mod openai;

pub use claude::ClaudeAdaptor;
pub use gemini::GeminiAdaptor;
pub use openai::OpenAiAdaptor;

/// The per-upstream translation capability set. One implementation per
/// channel type; selection is a pure function of the channel, never of the
/// inbound dialect (which arrives as a parameter instead).
#[async_trait]
pub trait Adaptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Latches per-request mode (stream/unary) off the relay info.
    fn init(&mut self, info: &RelayInfo);

    /// The wire dialect this adapter speaks upstream for the request. Drives
    /// body translation, stream re-framing, and usage parsing.
    fn native_dialect(&self, info: &RelayInfo) -> ApiDialect;

    /// Full endpoint URL, including the channel's effective base URL and any
    /// model-derived path segments.
    fn request_url(&self, info: &RelayInfo, channel: &Channel) -> Result<String, RelayError>;

    /// Installs auth and protocol headers for the upstream.
    fn setup_headers(
        &self,
        headers: &mut HeaderMap,
        info: &RelayInfo,
        channel: &Channel,
    ) -> Result<(), RelayError>;

    /// Translates the inbound body (dialect recorded in `info`) into this
    /// adapter's native body, with the upstream model name in place.
    fn convert_request(&self, info: &RelayInfo, body: Value) -> Result<Value, RelayError>;

    /// Issues the outbound call. The default covers every JSON-POST upstream.
    async fn do_request(
        &self,
        client: &reqwest::Client,
        url: &str,
        headers: HeaderMap,
        body: String,
        timeout: Duration,
    ) -> Result<reqwest::Response, RelayError> {
        client
            .post(url)
            .headers(headers)
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RelayError::upstream_transport(format!("upstream request failed: {}", e)))
    }

    /// Advertised public model names, for administrative listing.
    fn model_list(&self, channel: &Channel) -> Vec<String> {
        channel.model_names()
    }
}

pub fn for_channel_type(channel_type: ChannelType) -> Box<dyn Adaptor> {
    match channel_type {
        ChannelType::OpenAi => Box::new(OpenAiAdaptor::default()),
        ChannelType::Claude => Box::new(ClaudeAdaptor::default()),
        ChannelType::Gemini => Box::new(GeminiAdaptor::default()),
    }
}
