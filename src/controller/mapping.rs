use std::collections::{BTreeMap, BTreeSet, HashMap};

use axum::{extract::Query, Json};
use serde::{Deserialize, Serialize};

use crate::controller::{ApiError, ApiOk};
use crate::database::ability::Ability;
use crate::database::channel::{default_base_url, parse_model_mapping, Channel};
use crate::schema::enum_def::{
    ChannelType, CHANNEL_STATUS_ENABLED, CHANNEL_STATUS_MANUALLY_DISABLED,
};

#[derive(Debug, Serialize)]
pub struct MappingChannelItem {
    pub channel_id: i64,
    pub channel_name: String,
    pub channel_type: i32,
    pub channel_status: i32,
    pub ability_enabled: bool,
    pub weight: i64,
    pub priority: i64,
    pub tag: String,
    pub base_url: String,
    pub upstream_model: String,
    pub mapping_applied: bool,
}

#[derive(Debug, Serialize)]
pub struct MappingItem {
    pub group: String,
    pub model: String,
    pub channels: Vec<MappingChannelItem>,
}

#[derive(Debug, Serialize)]
pub struct MappingResponse {
    pub groups: Vec<String>,
    pub items: Vec<MappingItem>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MappingQuery {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub q: String,
    pub enabled_only: Option<String>,
}

/// GET /api/mapping/ — the denormalized routing table, grouped by
/// (group, model), channels in scan order. The remap blob is resolved here so
/// the UI sees the effective upstream model per channel.
pub async fn get_mappings(
    Query(query): Query<MappingQuery>,
) -> Result<Json<ApiOk<MappingResponse>>, ApiError> {
    let enabled_only = !matches!(query.enabled_only.as_deref(), Some("false") | Some("0"));
    let rows = Ability::get_mapping_rows(&query.group, enabled_only, &query.q)?;

    let mut groups = BTreeSet::new();
    let mut items: BTreeMap<(String, String), MappingItem> = BTreeMap::new();
    let mut mapping_cache: HashMap<i64, HashMap<String, String>> = HashMap::new();

    for row in rows {
        groups.insert(row.group_name.clone());
        let mapping = mapping_cache
            .entry(row.channel_id)
            .or_insert_with(|| parse_model_mapping(row.model_mapping.as_deref()));

        let (upstream_model, mapping_applied) = match mapping.get(&row.model) {
            Some(mapped) if !mapped.is_empty() => (mapped.clone(), true),
            _ => (row.model.clone(), false),
        };

        let base_url = match row.base_url.as_deref().filter(|s| !s.is_empty()) {
            Some(url) => url.to_string(),
            None => ChannelType::from_i32(row.channel_type)
                .map(default_base_url)
                .unwrap_or("")
                .to_string(),
        };

        let key = (row.group_name.clone(), row.model.clone());
        let item = items.entry(key).or_insert_with(|| MappingItem {
            group: row.group_name.clone(),
            model: row.model.clone(),
            channels: Vec::new(),
        });
        item.channels.push(MappingChannelItem {
            channel_id: row.channel_id,
            channel_name: row.channel_name,
            channel_type: row.channel_type,
            channel_status: row.channel_status,
            ability_enabled: row.enabled,
            weight: row.weight,
            priority: row.priority,
            tag: row.tag.unwrap_or_default(),
            base_url,
            upstream_model,
            mapping_applied,
        });
    }

    Ok(Json(ApiOk::data(MappingResponse {
        groups: groups.into_iter().collect(),
        items: items.into_values().collect(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAbilityRequest {
    pub group: String,
    pub model: String,
    pub channel_id: i64,
    pub weight: Option<i64>,
    pub priority: Option<i64>,
}

/// PATCH /api/mapping/ability — priority/weight patch, idempotent.
pub async fn update_mapping_ability(
    Json(request): Json<UpdateAbilityRequest>,
) -> Result<ApiOk<()>, ApiError> {
    if request.group.is_empty() || request.model.is_empty() || request.channel_id == 0 {
        return Err(ApiError::ParamInvalid(Some("invalid params".to_string())));
    }
    if request.weight.is_none() && request.priority.is_none() {
        return Err(ApiError::ParamInvalid(Some("no updates".to_string())));
    }
    Ability::update_ability(
        &request.group,
        &request.model,
        request.channel_id,
        request.priority,
        request.weight,
    )?;
    Ok(ApiOk::empty())
}

#[derive(Debug, Deserialize)]
pub struct UpdateAbilityEnabledRequest {
    pub group: String,
    pub model: String,
    pub channel_id: i64,
    pub enabled: Option<bool>,
}

/// PATCH /api/mapping/ability_enabled
pub async fn update_mapping_ability_enabled(
    Json(request): Json<UpdateAbilityEnabledRequest>,
) -> Result<ApiOk<()>, ApiError> {
    let enabled = match request.enabled {
        Some(enabled) => enabled,
        None => return Err(ApiError::ParamInvalid(Some("invalid params".to_string()))),
    };
    if request.group.is_empty() || request.model.is_empty() || request.channel_id == 0 {
        return Err(ApiError::ParamInvalid(Some("invalid params".to_string())));
    }
    Ability::update_enabled(&request.group, &request.model, request.channel_id, enabled)?;
    Ok(ApiOk::empty())
}

#[derive(Debug, Deserialize)]
pub struct MappingPair {
    pub model: String,
    pub upstream_model: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelMappingRequest {
    pub channel_id: i64,
    #[serde(default)]
    pub mappings: Vec<MappingPair>,
}

/// PATCH /api/mapping/channel_mapping — wholesale remap rewrite. Pairs with an
/// empty side are dropped; duplicate source names reject the whole payload; an
/// empty result clears the channel's remap.
pub async fn update_channel_mapping(
    Json(request): Json<UpdateChannelMappingRequest>,
) -> Result<ApiOk<()>, ApiError> {
    if request.channel_id == 0 {
        return Err(ApiError::ParamInvalid(Some("invalid channel_id".to_string())));
    }

    let mut mapping = HashMap::new();
    for pair in &request.mappings {
        let model = pair.model.trim();
        let upstream = pair.upstream_model.trim();
        if model.is_empty() || upstream.is_empty() {
            continue;
        }
        if mapping.contains_key(model) {
            return Err(ApiError::ParamInvalid(Some(
                "duplicate model mapping".to_string(),
            )));
        }
        mapping.insert(model.to_string(), upstream.to_string());
    }

    let serialized = if mapping.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&mapping).map_err(|e| {
            ApiError::Internal(Some(format!("failed to serialize mapping: {}", e)))
        })?)
    };
    Channel::update_model_mapping(request.channel_id, serialized)?;
    Ok(ApiOk::empty())
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelStatusRequest {
    pub channel_id: i64,
    pub enabled: Option<bool>,
}

/// PATCH /api/mapping/channel_status — manual enable/disable with the reason
/// recorded on the transition.
pub async fn update_mapping_channel_status(
    Json(request): Json<UpdateChannelStatusRequest>,
) -> Result<ApiOk<()>, ApiError> {
    let enabled = match request.enabled {
        Some(enabled) => enabled,
        None => return Err(ApiError::ParamInvalid(Some("invalid params".to_string()))),
    };
    if request.channel_id == 0 {
        return Err(ApiError::ParamInvalid(Some("invalid params".to_string())));
    }
    let status = if enabled {
        CHANNEL_STATUS_ENABLED
    } else {
        CHANNEL_STATUS_MANUALLY_DISABLED
    };
    let updated =
        Channel::update_status(request.channel_id, status, "manual toggle from mapping")?;
    if !updated {
        return Err(ApiError::NotFound(Some(
            "failed to update channel status".to_string(),
        )));
    }
    Ok(ApiOk::empty())
}
