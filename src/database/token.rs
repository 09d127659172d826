use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;

use crate::controller::ApiError;
use crate::database::{get_connection, DbResult};
use crate::schema::enum_def::TOKEN_STATUS_ENABLED;
use crate::utils::ID_GENERATOR;
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable, Insertable)]
    #[diesel(table_name = tokens)]
    pub struct Token {
        pub id: i64,
        pub user_id: i64,
        pub key: String,
        pub name: String,
        pub status: i32,
        pub remain_quota: i64,
        pub unlimited_quota: bool,
        pub group_name: Option<String>,
        pub created_at: i64,
        pub accessed_at: i64,
    }

    #[derive(AsChangeset, Deserialize)]
    #[diesel(table_name = tokens)]
    pub struct UpdateTokenData {
        pub name: Option<String>,
        pub status: Option<i32>,
        pub remain_quota: Option<i64>,
        pub unlimited_quota: Option<bool>,
        pub group_name: Option<Option<String>>,
    }
}

#[derive(Deserialize, Debug)]
pub struct NewTokenPayload {
    pub user_id: i64,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub remain_quota: i64,
    #[serde(default)]
    pub unlimited_quota: bool,
    pub group_name: Option<String>,
}

impl Token {
    pub fn is_enabled(&self) -> bool {
        self.status == TOKEN_STATUS_ENABLED
    }

    pub fn create(payload: &NewTokenPayload) -> DbResult<Token> {
        let now = Utc::now().timestamp_millis();
        let token = Token {
            id: ID_GENERATOR.generate_id(),
            user_id: payload.user_id,
            key: payload.key.clone(),
            name: payload.name.clone(),
            status: TOKEN_STATUS_ENABLED,
            remain_quota: payload.remain_quota,
            unlimited_quota: payload.unlimited_quota,
            group_name: payload.group_name.clone(),
            created_at: now,
            accessed_at: now,
        };
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::insert_into(tokens::table)
                .values(TokenDb::to_db(&token))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to insert token: {}", e)))
                })?;
        });
        Ok(token)
    }

    pub fn update(id_value: i64, data: &UpdateTokenData) -> DbResult<Token> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::update(tokens::table.find(id_value))
                .set(UpdateTokenDataDb::to_db(data))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to update token {}: {}",
                        id_value, e
                    )))
                })?;
        });
        Self::get_by_id(id_value)
    }

    pub fn delete(id_value: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::delete(tokens::table.find(id_value))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to delete token {}: {}",
                        id_value, e
                    )))
                })
        })
    }

    pub fn get_by_id(id_value: i64) -> DbResult<Token> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_token = tokens::table
                .find(id_value)
                .select(TokenDb::as_select())
                .first::<TokenDb>(conn)
                .map_err(|e| match e {
                    diesel::result::Error::NotFound => {
                        ApiError::NotFound(Some(format!("Token with id {} not found", id_value)))
                    }
                    _ => ApiError::DatabaseFatal(Some(format!(
                        "Error fetching token {}: {}",
                        id_value, e
                    ))),
                })?;
            Ok(db_token.from_db())
        })
    }

    /// Looks a token up by its key bytes (the `sk-` prefix already stripped).
    pub fn get_by_key(key_value: &str) -> DbResult<Option<Token>> {
        let conn = &mut get_connection();
        let key_value = key_value.to_string();
        db_execute!(conn, {
            let db_token = tokens::table
                .filter(tokens::dsl::key.eq(key_value.clone()))
                .select(TokenDb::as_select())
                .first::<TokenDb>(conn)
                .optional()
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Error fetching token by key: {}", e)))
                })?;
            Ok(db_token.map(|t| t.from_db()))
        })
    }

    pub fn list_all() -> DbResult<Vec<Token>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_tokens = tokens::table
                .order(tokens::dsl::created_at.desc())
                .select(TokenDb::as_select())
                .load::<TokenDb>(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to list tokens: {}", e)))
                })?;
            Ok(db_tokens.into_iter().map(|t| t.from_db()).collect())
        })
    }

    /// Atomic debit guarded on (id, key) and a non-negative result. Returns
    /// the affected row count; zero means the guard rejected the mutation.
    pub fn decrease_quota(id_value: i64, key_value: &str, amount: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        let now = Utc::now().timestamp_millis();
        let key_value = key_value.to_string();
        db_execute!(conn, {
            diesel::update(
                tokens::table
                    .find(id_value)
                    .filter(tokens::dsl::key.eq(key_value.clone()))
                    .filter(tokens::dsl::remain_quota.ge(amount)),
            )
            .set((
                tokens::dsl::remain_quota.eq(tokens::dsl::remain_quota - amount),
                tokens::dsl::accessed_at.eq(now),
            ))
            .execute(conn)
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!(
                    "Failed to decrease token {} quota: {}",
                    id_value, e
                )))
            })
        })
    }

    /// Atomic credit, same (id, key) sanity guard.
    pub fn increase_quota(id_value: i64, key_value: &str, amount: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        let key_value = key_value.to_string();
        db_execute!(conn, {
            diesel::update(
                tokens::table
                    .find(id_value)
                    .filter(tokens::dsl::key.eq(key_value.clone())),
            )
            .set(tokens::dsl::remain_quota.eq(tokens::dsl::remain_quota + amount))
            .execute(conn)
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!(
                    "Failed to increase token {} quota: {}",
                    id_value, e
                )))
            })
        })
    }
}
