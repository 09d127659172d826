use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::controller::ApiError;
use crate::database::{get_connection, DbResult, ListResult};
use crate::utils::ID_GENERATOR;
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable, Insertable)]
    #[diesel(table_name = logs)]
    pub struct ConsumeLog {
        pub id: i64,
        pub user_id: i64,
        pub channel_id: i64,
        pub token_id: i64,
        pub model_name: String,
        pub token_name: String,
        pub prompt_tokens: i32,
        pub completion_tokens: i32,
        pub quota: i64,
        pub content: String,
        pub use_time_seconds: i32,
        pub is_stream: bool,
        pub group_name: String,
        pub other: Option<String>,
        pub created_at: i64,
    }
}

/// Everything one POST_CHARGE writes, public model name included.
#[derive(Debug, Clone)]
pub struct RecordConsumeLogParams {
    pub user_id: i64,
    pub channel_id: i64,
    pub token_id: i64,
    pub model_name: String,
    pub token_name: String,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub quota: i64,
    pub content: String,
    pub use_time_seconds: i32,
    pub is_stream: bool,
    pub group_name: String,
    pub other: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LogQuery {
    pub user_id: Option<i64>,
    pub model_name: Option<String>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
}

impl ConsumeLog {
    /// Append-only write; one row per request that reached POST_CHARGE.
    pub fn record(params: RecordConsumeLogParams) -> DbResult<ConsumeLog> {
        let log = ConsumeLog {
            id: ID_GENERATOR.generate_id(),
            user_id: params.user_id,
            channel_id: params.channel_id,
            token_id: params.token_id,
            model_name: params.model_name,
            token_name: params.token_name,
            prompt_tokens: params.prompt_tokens,
            completion_tokens: params.completion_tokens,
            quota: params.quota,
            content: params.content,
            use_time_seconds: params.use_time_seconds,
            is_stream: params.is_stream,
            group_name: params.group_name,
            other: params.other,
            created_at: Utc::now().timestamp_millis(),
        };
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::insert_into(logs::table)
                .values(ConsumeLogDb::to_db(&log))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to insert consume log: {}", e)))
                })?;
        });
        Ok(log)
    }

    pub fn list(query: &LogQuery) -> DbResult<ListResult<ConsumeLog>> {
        let page = query.page.max(0);
        let page_size = if query.page_size <= 0 {
            20
        } else {
            query.page_size.min(100)
        };
        let conn = &mut get_connection();
        let user_filter = query.user_id;
        let model_filter = query.model_name.clone().filter(|m| !m.is_empty());
        db_execute!(conn, {
            let mut count_query = logs::table.count().into_boxed();
            let mut list_query = logs::table
                .select(ConsumeLogDb::as_select())
                .into_boxed();
            if let Some(user_id) = user_filter {
                count_query = count_query.filter(logs::dsl::user_id.eq(user_id));
                list_query = list_query.filter(logs::dsl::user_id.eq(user_id));
            }
            if let Some(model_name) = model_filter.clone() {
                count_query = count_query.filter(logs::dsl::model_name.eq(model_name.clone()));
                list_query = list_query.filter(logs::dsl::model_name.eq(model_name));
            }
            let total = count_query.get_result::<i64>(conn).map_err(|e| {
                ApiError::DatabaseFatal(Some(format!("Failed to count logs: {}", e)))
            })?;
            let db_logs = list_query
                .order(logs::dsl::created_at.desc())
                .offset(page * page_size)
                .limit(page_size)
                .load::<ConsumeLogDb>(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to list logs: {}", e)))
                })?;
            Ok(ListResult {
                total,
                list: db_logs.into_iter().map(|l| l.from_db()).collect(),
            })
        })
    }
}
