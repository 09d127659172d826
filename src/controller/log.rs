use axum::{extract::Query, Json};

use crate::controller::{ApiError, ApiOk};
use crate::database::log::{ConsumeLog, LogQuery};
use crate::database::ListResult;

/// GET /api/log/ — paged consumption log listing with user/model filters.
pub async fn list_logs(
    Query(query): Query<LogQuery>,
) -> Result<Json<ApiOk<ListResult<ConsumeLog>>>, ApiError> {
    Ok(Json(ApiOk::data(ConsumeLog::list(&query)?)))
}
