use serde::{Deserialize, Serialize};

/// Which adapter serves a channel. Stored as an integer column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[default]
    OpenAi = 1,
    Claude = 2,
    Gemini = 3,
}

impl ChannelType {
    pub fn from_i32(value: i32) -> Option<ChannelType> {
        match value {
            1 => Some(ChannelType::OpenAi),
            2 => Some(ChannelType::Claude),
            3 => Some(ChannelType::Gemini),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

pub const CHANNEL_STATUS_ENABLED: i32 = 1;
pub const CHANNEL_STATUS_MANUALLY_DISABLED: i32 = 2;
pub const CHANNEL_STATUS_AUTO_DISABLED: i32 = 3;

pub const TOKEN_STATUS_ENABLED: i32 = 1;
pub const TOKEN_STATUS_DISABLED: i32 = 2;

pub const USER_STATUS_ENABLED: i32 = 1;

/// The wire shape of an inbound request (and, for adapters, of the upstream
/// reply). Decided from the request path, never from the channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiDialect {
    OpenAiChat,
    OpenAiResponses,
    ClaudeMessages,
    GeminiGenerate,
}

impl ApiDialect {
    /// The native dialect family used for usage parsing and stream framing.
    pub fn is_openai_shaped(self) -> bool {
        matches!(self, ApiDialect::OpenAiChat | ApiDialect::OpenAiResponses)
    }
}

/// What kind of payload is relayed, decided by the inbound route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayMode {
    Chat,
    Responses,
    Embeddings,
    Rerank,
    Image,
    Audio,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_type_round_trips_through_storage_int() {
        for t in [ChannelType::OpenAi, ChannelType::Claude, ChannelType::Gemini] {
            assert_eq!(ChannelType::from_i32(t.as_i32()), Some(t));
        }
        assert_eq!(ChannelType::from_i32(99), None);
    }
}
