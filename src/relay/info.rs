use chrono::Utc;

use crate::database::token::Token;
use crate::database::user::User;
use crate::schema::enum_def::{ApiDialect, RelayMode};

pub const BILLING_SOURCE_WALLET: &str = "wallet";

/// Resolved price facts for one request. Ratios default to 1 and scale the
/// format-specific token classes.
#[derive(Debug, Clone)]
pub struct PriceData {
    /// Dollars per million tokens.
    pub model_price: f64,
    pub use_price: bool,
    pub free_model: bool,
    pub group_ratio: f64,
    pub quota_to_pre_consume: i64,
    pub cache_ratio: f64,
    pub image_ratio: f64,
    pub audio_ratio: f64,
}

impl Default for PriceData {
    fn default() -> Self {
        PriceData {
            model_price: 0.0,
            use_price: true,
            free_model: true,
            group_ratio: 1.0,
            quota_to_pre_consume: 0,
            cache_ratio: 1.0,
            image_ratio: 1.0,
            audio_ratio: 1.0,
        }
    }
}

/// The per-request state bag. Built once at dispatch, moved through the
/// pipeline, shared immutably with adapters; never outlives its request.
#[derive(Debug, Clone)]
pub struct RelayInfo {
    pub user_id: i64,
    pub user_quota: i64,
    pub notify_type: String,
    pub quota_warning_threshold: i64,
    pub accept_unset_model_price: bool,

    pub token_id: i64,
    pub token_key: String,
    pub token_name: String,
    pub token_unlimited: bool,

    pub using_group: String,
    pub origin_model_name: String,
    pub upstream_model_name: String,
    pub channel_id: i64,

    pub dialect: ApiDialect,
    pub relay_mode: RelayMode,
    pub is_stream: bool,
    pub is_playground: bool,
    pub billing_source: String,

    pub start_time: i64,
    pub final_pre_consumed_quota: i64,
    pub prompt_tokens_estimate: i32,
    pub price_data: PriceData,
}

impl RelayInfo {
    /// Group resolution: an admin-set auto_group override wins, then the
    /// token's override, then the user's own group.
    pub fn new(
        token: &Token,
        user: &User,
        auto_group: Option<String>,
        dialect: ApiDialect,
        relay_mode: RelayMode,
    ) -> RelayInfo {
        let using_group = auto_group
            .filter(|g| !g.is_empty())
            .or_else(|| token.group_name.clone().filter(|g| !g.is_empty()))
            .unwrap_or_else(|| user.group_name.clone());
        RelayInfo {
            user_id: user.id,
            user_quota: user.quota,
            notify_type: user.notify_type.clone(),
            quota_warning_threshold: user.quota_warning_threshold,
            accept_unset_model_price: user.accept_unset_model_price,
            token_id: token.id,
            token_key: token.key.clone(),
            token_name: token.name.clone(),
            token_unlimited: token.unlimited_quota,
            using_group,
            origin_model_name: String::new(),
            upstream_model_name: String::new(),
            channel_id: 0,
            dialect,
            relay_mode,
            is_stream: false,
            is_playground: false,
            billing_source: BILLING_SOURCE_WALLET.to_string(),
            start_time: Utc::now().timestamp_millis(),
            final_pre_consumed_quota: 0,
            prompt_tokens_estimate: 0,
            price_data: PriceData::default(),
        }
    }

    pub fn elapsed_seconds(&self) -> i32 {
        ((Utc::now().timestamp_millis() - self.start_time) / 1000) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::enum_def::{TOKEN_STATUS_ENABLED, USER_STATUS_ENABLED};

    fn token(group: Option<&str>) -> Token {
        Token {
            id: 7,
            user_id: 3,
            key: "abc".to_string(),
            name: "t".to_string(),
            status: TOKEN_STATUS_ENABLED,
            remain_quota: 0,
            unlimited_quota: false,
            group_name: group.map(|g| g.to_string()),
            created_at: 0,
            accessed_at: 0,
        }
    }

    fn user() -> User {
        User {
            id: 3,
            username: "u".to_string(),
            status: USER_STATUS_ENABLED,
            quota: 100,
            used_quota: 0,
            request_count: 0,
            group_name: "default".to_string(),
            notify_type: "email".to_string(),
            quota_warning_threshold: 0,
            accept_unset_model_price: false,
        }
    }

    #[test]
    fn group_resolution_order() {
        let info = RelayInfo::new(
            &token(None),
            &user(),
            None,
            ApiDialect::OpenAiChat,
            RelayMode::Chat,
        );
        assert_eq!(info.using_group, "default");

        let info = RelayInfo::new(
            &token(Some("vip")),
            &user(),
            None,
            ApiDialect::OpenAiChat,
            RelayMode::Chat,
        );
        assert_eq!(info.using_group, "vip");

        let info = RelayInfo::new(
            &token(Some("vip")),
            &user(),
            Some("auto".to_string()),
            ApiDialect::OpenAiChat,
            RelayMode::Chat,
        );
        assert_eq!(info.using_group, "auto");
    }
}
