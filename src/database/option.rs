use diesel::prelude::*;

use crate::controller::ApiError;
use crate::database::{get_connection, DbResult};
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = options)]
    pub struct OptionRow {
        pub key: String,
        pub value: String,
    }
}

impl OptionRow {
    pub fn load_all() -> DbResult<Vec<OptionRow>> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            let rows = options::table
                .select(OptionRowDb::as_select())
                .load::<OptionRowDb>(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to load options: {}", e)))
                })?;
            Ok(rows.into_iter().map(|r| r.from_db()).collect())
        })
    }

    /// Update-then-insert upsert; both backends lack a shared native form.
    pub fn set(key_value: &str, value_value: &str) -> DbResult<()> {
        let conn = &mut get_connection();
        let row = OptionRow {
            key: key_value.to_string(),
            value: value_value.to_string(),
        };
        db_execute!(conn, {
            let affected = diesel::update(
                options::table.filter(options::dsl::key.eq(row.key.clone())),
            )
            .set(options::dsl::value.eq(row.value.clone()))
            .execute(conn)
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!("Failed to update option: {}", e)))
            })?;
            if affected == 0 {
                diesel::insert_into(options::table)
                    .values(OptionRowDb::to_db(&row))
                    .execute(conn)
                    .map_err(|e| {
                        ApiError::DatabaseFatal(Some(format!("Failed to insert option: {}", e)))
                    })?;
            }
            Ok(())
        })
    }
}
