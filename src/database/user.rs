use diesel::prelude::*;

use crate::controller::ApiError;
use crate::database::{get_connection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Identifiable)]
    #[diesel(table_name = users)]
    pub struct User {
        pub id: i64,
        pub username: String,
        pub status: i32,
        pub quota: i64,
        pub used_quota: i64,
        pub request_count: i64,
        pub group_name: String,
        pub notify_type: String,
        pub quota_warning_threshold: i64,
        pub accept_unset_model_price: bool,
    }
}

impl User {
    pub fn get_by_id(id_value: i64) -> DbResult<User> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let db_user = users::table
                .find(id_value)
                .select(UserDb::as_select())
                .first::<UserDb>(conn)
                .map_err(|e| match e {
                    diesel::result::Error::NotFound => {
                        ApiError::NotFound(Some(format!("User with id {} not found", id_value)))
                    }
                    _ => ApiError::DatabaseFatal(Some(format!(
                        "Error fetching user {}: {}",
                        id_value, e
                    ))),
                })?;
            Ok(db_user.from_db())
        })
    }

    /// Atomic ledger debit; the balance may not go negative. Returns the
    /// affected row count; zero means the balance could not cover the amount.
    pub fn decrease_quota(id_value: i64, amount: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::update(
                users::table
                    .find(id_value)
                    .filter(users::dsl::quota.ge(amount)),
            )
            .set(users::dsl::quota.eq(users::dsl::quota - amount))
            .execute(conn)
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!(
                    "Failed to decrease user {} quota: {}",
                    id_value, e
                )))
            })
        })
    }

    /// Atomic ledger credit.
    pub fn increase_quota(
        id_value: i64,
        amount: i64,
        include_request_count: bool,
    ) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let affected = if include_request_count {
                diesel::update(users::table.find(id_value))
                    .set((
                        users::dsl::quota.eq(users::dsl::quota + amount),
                        users::dsl::request_count.eq(users::dsl::request_count + 1),
                    ))
                    .execute(conn)
            } else {
                diesel::update(users::table.find(id_value))
                    .set(users::dsl::quota.eq(users::dsl::quota + amount))
                    .execute(conn)
            }
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!(
                    "Failed to increase user {} quota: {}",
                    id_value, e
                )))
            })?;
            Ok(affected)
        })
    }

    /// Consumption statistics, separate from the spendable balance.
    pub fn update_used_quota_and_request_count(id_value: i64, amount: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::update(users::table.find(id_value))
                .set((
                    users::dsl::used_quota.eq(users::dsl::used_quota + amount),
                    users::dsl::request_count.eq(users::dsl::request_count + 1),
                ))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to update user {} usage stats: {}",
                        id_value, e
                    )))
                })
        })
    }
}
