use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::controller::ApiError;
use crate::database::{get_connection, DbResult};
use crate::schema::enum_def::{ChannelType, CHANNEL_STATUS_ENABLED};
use crate::utils::{split_csv, ID_GENERATOR};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = channels)]
    pub struct Channel {
        pub id: i64,
        pub name: String,
        pub channel_type: i32,
        pub status: i32,
        pub key: String,
        pub base_url: Option<String>,
        pub models: String,
        pub group_names: String,
        pub model_mapping: Option<String>,
        pub tag: Option<String>,
        pub priority: i64,
        pub weight: i64,
        pub used_quota: i64,
        pub status_reason: Option<String>,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(Insertable)]
    #[diesel(table_name = channels)]
    pub struct NewChannel {
        pub id: i64,
        pub name: String,
        pub channel_type: i32,
        pub status: i32,
        pub key: String,
        pub base_url: Option<String>,
        pub models: String,
        pub group_names: String,
        pub model_mapping: Option<String>,
        pub tag: Option<String>,
        pub priority: i64,
        pub weight: i64,
        pub used_quota: i64,
        pub created_at: i64,
        pub updated_at: i64,
    }

    #[derive(AsChangeset, Deserialize)]
    #[diesel(table_name = channels)]
    pub struct UpdateChannelData {
        pub name: Option<String>,
        pub channel_type: Option<i32>,
        pub key: Option<String>,
        pub base_url: Option<Option<String>>,
        pub models: Option<String>,
        pub group_names: Option<String>,
        pub tag: Option<Option<String>>,
        pub priority: Option<i64>,
        pub weight: Option<i64>,
    }
}

/// Endpoint used when a channel leaves `base_url` empty, keyed by adapter type.
pub fn default_base_url(channel_type: ChannelType) -> &'static str {
    match channel_type {
        ChannelType::OpenAi => "https://api.openai.com",
        ChannelType::Claude => "https://api.anthropic.com",
        ChannelType::Gemini => "https://generativelanguage.googleapis.com",
    }
}

#[derive(Deserialize, Debug)]
pub struct NewChannelPayload {
    pub name: String,
    pub channel_type: i32,
    pub key: String,
    pub base_url: Option<String>,
    pub models: String,
    pub group_names: Option<String>,
    pub model_mapping: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub weight: i64,
}

impl Channel {
    pub fn adapter_type(&self) -> Option<ChannelType> {
        ChannelType::from_i32(self.channel_type)
    }

    pub fn is_enabled(&self) -> bool {
        self.status == CHANNEL_STATUS_ENABLED
    }

    /// The channel's own base URL, or the per-type default when unset.
    pub fn effective_base_url(&self) -> String {
        match self.base_url.as_deref().filter(|s| !s.is_empty()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self
                .adapter_type()
                .map(default_base_url)
                .unwrap_or("")
                .to_string(),
        }
    }

    pub fn model_names(&self) -> Vec<String> {
        split_csv(&self.models)
    }

    pub fn group_list(&self) -> Vec<String> {
        split_csv(&self.group_names)
    }

    /// Parses the remap blob. Malformed JSON reads as "no remap".
    pub fn mapping_table(&self) -> HashMap<String, String> {
        parse_model_mapping(self.model_mapping.as_deref())
    }

    /// upstream_model = remap[requested] if present, else the requested name.
    pub fn resolve_upstream_model(&self, requested: &str) -> String {
        self.mapping_table()
            .get(requested)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }

    pub fn create(payload: &NewChannelPayload) -> DbResult<Channel> {
        let now = Utc::now().timestamp_millis();
        let new_channel = NewChannel {
            id: ID_GENERATOR.generate_id(),
            name: payload.name.clone(),
            channel_type: payload.channel_type,
            status: CHANNEL_STATUS_ENABLED,
            key: payload.key.clone(),
            base_url: payload.base_url.clone(),
            models: payload.models.clone(),
            group_names: payload
                .group_names
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            model_mapping: payload.model_mapping.clone(),
            tag: payload.tag.clone(),
            priority: payload.priority,
            weight: payload.weight,
            used_quota: 0,
            created_at: now,
            updated_at: now,
        };
        let channel_id = new_channel.id;

        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::insert_into(channels::table)
                .values(NewChannelDb::to_db(&new_channel))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to insert channel: {}", e)))
                })?;
        });
        Self::get_by_id(channel_id)
    }

    pub fn update(id_value: i64, data: &UpdateChannelData) -> DbResult<Channel> {
        let conn = &mut get_connection();
        let current_time = Utc::now().timestamp_millis();
        db_execute!(conn, {
            diesel::update(channels::table.find(id_value))
                .set((
                    UpdateChannelDataDb::to_db(data),
                    channels::dsl::updated_at.eq(current_time),
                ))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to update channel {}: {}",
                        id_value, e
                    )))
                })?;
        });
        Self::get_by_id(id_value)
    }

    pub fn delete(id_value: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::delete(channels::table.find(id_value))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to delete channel {}: {}",
                        id_value, e
                    )))
                })
        })
    }

    pub fn get_by_id(id_value: i64) -> DbResult<Channel> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_channel = channels::table
                .find(id_value)
                .select(ChannelDb::as_select())
                .first::<ChannelDb>(conn)
                .map_err(|e| match e {
                    diesel::result::Error::NotFound => ApiError::NotFound(Some(format!(
                        "Channel with id {} not found",
                        id_value
                    ))),
                    _ => ApiError::DatabaseFatal(Some(format!(
                        "Error fetching channel {}: {}",
                        id_value, e
                    ))),
                })?;
            Ok(db_channel.from_db())
        })
    }

    pub fn list_all() -> DbResult<Vec<Channel>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_channels = channels::table
                .order(channels::dsl::created_at.desc())
                .select(ChannelDb::as_select())
                .load::<ChannelDb>(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to list channels: {}", e)))
                })?;
            Ok(db_channels.into_iter().map(|c| c.from_db()).collect())
        })
    }

    /// Transitions the status and records why. Returns whether a row changed.
    pub fn update_status(id_value: i64, status: i32, reason: &str) -> DbResult<bool> {
        let conn = &mut get_connection();
        let current_time = Utc::now().timestamp_millis();
        db_execute!(conn, {
            let affected = diesel::update(channels::table.find(id_value))
                .set((
                    channels::dsl::status.eq(status),
                    channels::dsl::status_reason.eq(Some(reason.to_string())),
                    channels::dsl::updated_at.eq(current_time),
                ))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to update channel {} status: {}",
                        id_value, e
                    )))
                })?;
            Ok(affected > 0)
        })
    }

    /// Rewrites the remap blob wholesale. None clears it.
    pub fn update_model_mapping(id_value: i64, mapping: Option<String>) -> DbResult<usize> {
        let conn = &mut get_connection();
        let current_time = Utc::now().timestamp_millis();
        db_execute!(conn, {
            diesel::update(channels::table.find(id_value))
                .set((
                    channels::dsl::model_mapping.eq(mapping.clone()),
                    channels::dsl::updated_at.eq(current_time),
                ))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to update channel {} mapping: {}",
                        id_value, e
                    )))
                })
        })
    }

    /// Add-only usage counter.
    pub fn update_used_quota(id_value: i64, amount: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::update(channels::table.find(id_value))
                .set(channels::dsl::used_quota.eq(channels::dsl::used_quota + amount))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to bump channel {} used quota: {}",
                        id_value, e
                    )))
                })
        })
    }
}

pub fn parse_model_mapping(raw: Option<&str>) -> HashMap<String, String> {
    match raw {
        Some(raw) if !raw.is_empty() && raw != "{}" => {
            serde_json::from_str(raw).unwrap_or_default()
        }
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with(mapping: Option<&str>, base_url: Option<&str>) -> Channel {
        Channel {
            id: 1,
            name: "test".to_string(),
            channel_type: ChannelType::OpenAi.as_i32(),
            status: CHANNEL_STATUS_ENABLED,
            key: "k".to_string(),
            base_url: base_url.map(|s| s.to_string()),
            models: "gpt-x,gpt-y".to_string(),
            group_names: "default,vip".to_string(),
            model_mapping: mapping.map(|s| s.to_string()),
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
    fn remap_hits_and_misses() {
        let channel = channel_with(Some(r#"{"gpt-x":"gpt-x-real"}"#), None);
        assert_eq!(channel.resolve_upstream_model("gpt-x"), "gpt-x-real");
        assert_eq!(channel.resolve_upstream_model("gpt-y"), "gpt-y");
    }

    #[test]
    fn empty_or_malformed_mapping_is_identity() {
        for raw in [None, Some(""), Some("{}"), Some("not json")] {
            let channel = channel_with(raw, None);
            assert_eq!(channel.resolve_upstream_model("gpt-x"), "gpt-x");
        }
    }

    #[test]
    fn base_url_falls_back_per_type() {
        let channel = channel_with(None, None);
        assert_eq!(channel.effective_base_url(), "https://api.openai.com");
        let channel = channel_with(None, Some("https://proxy.example.com/"));
        assert_eq!(channel.effective_base_url(), "https://proxy.example.com");
    }

    #[test]
    fn model_and_group_lists_split() {
        let channel = channel_with(None, None);
        assert_eq!(channel.model_names(), vec!["gpt-x", "gpt-y"]);
        assert_eq!(channel.group_list(), vec!["default", "vip"]);
    }
}
