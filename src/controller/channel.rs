use axum::{extract::Path, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::{ApiError, ApiOk};
use crate::database::ability::Ability;
use crate::database::channel::{Channel, NewChannelPayload, UpdateChannelData};
use crate::relay::adapter::{self, Adaptor};

/// GET /api/channel/
pub async fn list_channels() -> Result<Json<ApiOk<Vec<Channel>>>, ApiError> {
    Ok(Json(ApiOk::data(Channel::list_all()?)))
}

/// POST /api/channel/ — creates the channel and seeds its routing facts.
pub async fn create_channel(
    Json(payload): Json<NewChannelPayload>,
) -> Result<Json<ApiOk<Channel>>, ApiError> {
    if payload.name.is_empty() || payload.key.is_empty() {
        return Err(ApiError::ParamInvalid(Some(
            "name and key are required".to_string(),
        )));
    }
    let channel = Channel::create(&payload)?;
    Ability::rebuild_for_channel(&channel)?;
    info!("channel {} created with {} models", channel.id, channel.model_names().len());
    Ok(Json(ApiOk::data(channel)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    pub id: i64,
    #[serde(flatten)]
    pub data: UpdateChannelData,
}

/// PUT /api/channel/ — updates the record, then regenerates abilities since
/// the advertised model or group set may have changed.
pub async fn update_channel(
    Json(request): Json<UpdateChannelRequest>,
) -> Result<Json<ApiOk<Channel>>, ApiError> {
    if request.id == 0 {
        return Err(ApiError::ParamInvalid(Some("invalid id".to_string())));
    }
    let channel = Channel::update(request.id, &request.data)?;
    Ability::rebuild_for_channel(&channel)?;
    Ok(Json(ApiOk::data(channel)))
}

/// DELETE /api/channel/{id}
pub async fn delete_channel(Path(id): Path<i64>) -> Result<ApiOk<()>, ApiError> {
    Channel::delete(id)?;
    Ability::delete_for_channel(id)?;
    Ok(ApiOk::empty())
}

#[derive(Debug, Serialize)]
pub struct ChannelModelsResponse {
    pub adapter: &'static str,
    pub models: Vec<String>,
}

/// GET /api/channel/{id}/models — the adapter's advertised model list.
pub async fn list_channel_models(
    Path(id): Path<i64>,
) -> Result<Json<ApiOk<ChannelModelsResponse>>, ApiError> {
    let channel = Channel::get_by_id(id)?;
    let channel_type = channel
        .adapter_type()
        .ok_or_else(|| ApiError::Internal(Some(format!("channel {} has unknown type", id))))?;
    let adaptor = adapter::for_channel_type(channel_type);
    Ok(Json(ApiOk::data(ChannelModelsResponse {
        adapter: adaptor.name(),
        models: adaptor.model_list(&channel),
    })))
}

/// POST /api/channel/fix — the "fix abilities" operation: regenerates the
/// whole ability table from the channel registry.
pub async fn fix_channel_abilities() -> Result<Json<ApiOk<usize>>, ApiError> {
    let channels = Channel::list_all()?;
    let mut rebuilt = 0;
    for channel in &channels {
        rebuilt += Ability::rebuild_for_channel(channel)?;
    }
    info!("rebuilt {} ability rows across {} channels", rebuilt, channels.len());
    Ok(Json(ApiOk::data(rebuilt)))
}
