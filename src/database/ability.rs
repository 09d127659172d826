use diesel::prelude::*;

use crate::controller::ApiError;
use crate::database::channel::Channel;
use crate::database::{get_connection, DbResult};
use crate::schema::enum_def::CHANNEL_STATUS_ENABLED;
use crate::{db_execute, db_object};

db_object! {
    #[derive(Queryable, Selectable, Insertable)]
    #[diesel(table_name = abilities)]
    pub struct Ability {
        pub group_name: String,
        pub model: String,
        pub channel_id: i64,
        pub enabled: bool,
        pub priority: i64,
        pub weight: i64,
        pub tag: Option<String>,
    }
}

/// One denormalized row of the mapping read path: an ability joined with its
/// channel. The model-mapping blob is returned raw; callers resolve it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MappingRow {
    pub group_name: String,
    pub model: String,
    pub channel_id: i64,
    pub enabled: bool,
    pub priority: i64,
    pub weight: i64,
    pub tag: Option<String>,
    pub channel_name: String,
    pub channel_type: i32,
    pub channel_status: i32,
    pub base_url: Option<String>,
    pub model_mapping: Option<String>,
}

/// A routing candidate for the selector: just enough to rank and pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityCandidate {
    pub channel_id: i64,
    pub priority: i64,
    pub weight: i64,
}

type MappingRowTuple = (
    String,
    String,
    i64,
    bool,
    i64,
    i64,
    Option<String>,
    String,
    i32,
    i32,
    Option<String>,
    Option<String>,
);

impl From<MappingRowTuple> for MappingRow {
    fn from(row: MappingRowTuple) -> Self {
        MappingRow {
            group_name: row.0,
            model: row.1,
            channel_id: row.2,
            enabled: row.3,
            priority: row.4,
            weight: row.5,
            tag: row.6,
            channel_name: row.7,
            channel_type: row.8,
            channel_status: row.9,
            base_url: row.10,
            model_mapping: row.11,
        }
    }
}

impl Ability {
    /// The mapping read path: abilities joined with channels, optionally
    /// filtered, ordered (group, model, priority desc, weight desc).
    pub fn get_mapping_rows(
        group: &str,
        enabled_only: bool,
        keyword: &str,
    ) -> DbResult<Vec<MappingRow>> {
        let conn = &mut get_connection();
        let group = group.trim().to_string();
        let keyword = keyword.trim().to_string();
        db_execute!(conn, {
            let mut query = abilities::table
                .inner_join(channels::table)
                .select((
                    abilities::dsl::group_name,
                    abilities::dsl::model,
                    abilities::dsl::channel_id,
                    abilities::dsl::enabled,
                    abilities::dsl::priority,
                    abilities::dsl::weight,
                    abilities::dsl::tag,
                    channels::dsl::name,
                    channels::dsl::channel_type,
                    channels::dsl::status,
                    channels::dsl::base_url,
                    channels::dsl::model_mapping,
                ))
                .into_boxed();

            if !group.is_empty() {
                query = query.filter(abilities::dsl::group_name.eq(group.clone()));
            }
            if enabled_only {
                query = query
                    .filter(abilities::dsl::enabled.eq(true))
                    .filter(channels::dsl::status.eq(CHANNEL_STATUS_ENABLED));
            }
            if !keyword.is_empty() {
                query = query.filter(abilities::dsl::model.like(format!("%{}%", keyword)));
            }

            let rows = query
                .order((
                    abilities::dsl::group_name.asc(),
                    abilities::dsl::model.asc(),
                    abilities::dsl::priority.desc(),
                    abilities::dsl::weight.desc(),
                ))
                .load::<MappingRowTuple>(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to load mapping rows: {}", e)))
                })?;
            Ok(rows.into_iter().map(MappingRow::from).collect())
        })
    }

    /// Routing candidates for one (group, model): ability enabled, channel
    /// enabled, excluded channels (failed earlier in this request) skipped.
    pub fn get_candidates(
        group: &str,
        model: &str,
        excluded_channel_ids: &[i64],
    ) -> DbResult<Vec<AbilityCandidate>> {
        let conn = &mut get_connection();
        let group = group.to_string();
        let model = model.to_string();
        let excluded = excluded_channel_ids.to_vec();
        db_execute!(conn, {
            let mut query = abilities::table
                .inner_join(channels::table)
                .filter(abilities::dsl::group_name.eq(group.clone()))
                .filter(abilities::dsl::model.eq(model.clone()))
                .filter(abilities::dsl::enabled.eq(true))
                .filter(channels::dsl::status.eq(CHANNEL_STATUS_ENABLED))
                .select((
                    abilities::dsl::channel_id,
                    abilities::dsl::priority,
                    abilities::dsl::weight,
                ))
                .into_boxed();
            if !excluded.is_empty() {
                query = query.filter(abilities::dsl::channel_id.ne_all(excluded.clone()));
            }
            let rows = query.load::<(i64, i64, i64)>(conn).map_err(|e| {
                ApiError::DatabaseFatal(Some(format!("Failed to load ability candidates: {}", e)))
            })?;
            Ok(rows
                .into_iter()
                .map(|(channel_id, priority, weight)| AbilityCandidate {
                    channel_id,
                    priority,
                    weight,
                })
                .collect())
        })
    }

    /// Distinct model names a group can currently reach.
    pub fn list_models_for_group(group: &str) -> DbResult<Vec<String>> {
        let conn = &mut get_connection();
        let group = group.to_string();
        db_execute!(conn, {
            abilities::table
                .inner_join(channels::table)
                .filter(abilities::dsl::group_name.eq(group.clone()))
                .filter(abilities::dsl::enabled.eq(true))
                .filter(channels::dsl::status.eq(CHANNEL_STATUS_ENABLED))
                .select(abilities::dsl::model)
                .distinct()
                .order(abilities::dsl::model.asc())
                .load::<String>(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!("Failed to list group models: {}", e)))
                })
        })
    }

    /// Patches priority and/or weight on one ability row.
    pub fn update_ability(
        group: &str,
        model: &str,
        channel_id: i64,
        priority: Option<i64>,
        weight: Option<i64>,
    ) -> DbResult<usize> {
        let conn = &mut get_connection();
        let group = group.to_string();
        let model = model.to_string();
        db_execute!(conn, {
            let target = abilities::table
                .filter(abilities::dsl::group_name.eq(group.clone()))
                .filter(abilities::dsl::model.eq(model.clone()))
                .filter(abilities::dsl::channel_id.eq(channel_id));
            let affected = match (priority, weight) {
                (Some(p), Some(w)) => diesel::update(target)
                    .set((abilities::dsl::priority.eq(p), abilities::dsl::weight.eq(w)))
                    .execute(conn),
                (Some(p), None) => diesel::update(target)
                    .set(abilities::dsl::priority.eq(p))
                    .execute(conn),
                (None, Some(w)) => diesel::update(target)
                    .set(abilities::dsl::weight.eq(w))
                    .execute(conn),
                (None, None) => Ok(0),
            }
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!("Failed to update ability: {}", e)))
            })?;
            Ok(affected)
        })
    }

    pub fn update_enabled(
        group: &str,
        model: &str,
        channel_id: i64,
        enabled: bool,
    ) -> DbResult<usize> {
        let conn = &mut get_connection();
        let group = group.to_string();
        let model = model.to_string();
        db_execute!(conn, {
            diesel::update(
                abilities::table
                    .filter(abilities::dsl::group_name.eq(group.clone()))
                    .filter(abilities::dsl::model.eq(model.clone()))
                    .filter(abilities::dsl::channel_id.eq(channel_id)),
            )
            .set(abilities::dsl::enabled.eq(enabled))
            .execute(conn)
            .map_err(|e| {
                ApiError::DatabaseFatal(Some(format!("Failed to toggle ability: {}", e)))
            })
        })
    }

    /// The "fix abilities" operation: drops and regenerates every routing fact
    /// a channel advertises (groups x models), inheriting the channel's
    /// priority, weight, tag, and enablement.
    pub fn rebuild_for_channel(channel: &Channel) -> DbResult<usize> {
        let mut rows = Vec::new();
        for group in channel.group_list() {
            for model in channel.model_names() {
                rows.push(Ability {
                    group_name: group.clone(),
                    model,
                    channel_id: channel.id,
                    enabled: channel.is_enabled(),
                    priority: channel.priority,
                    weight: channel.weight,
                    tag: channel.tag.clone(),
                });
            }
        }

        let conn = &mut get_connection();
        let channel_id = channel.id;
        db_execute!(conn, {
            diesel::delete(abilities::table.filter(abilities::dsl::channel_id.eq(channel_id)))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to clear abilities for channel {}: {}",
                        channel_id, e
                    )))
                })?;
            let db_rows: Vec<AbilityDb> = rows.iter().map(AbilityDb::to_db).collect();
            diesel::insert_into(abilities::table)
                .values(&db_rows)
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to rebuild abilities for channel {}: {}",
                        channel_id, e
                    )))
                })
        })
    }

    pub fn delete_for_channel(channel_id: i64) -> DbResult<usize> {
        let conn = &mut get_connection();
        db_execute!(conn, {
            diesel::delete(abilities::table.filter(abilities::dsl::channel_id.eq(channel_id)))
                .execute(conn)
                .map_err(|e| {
                    ApiError::DatabaseFatal(Some(format!(
                        "Failed to delete abilities for channel {}: {}",
                        channel_id, e
                    )))
                })
        })
    }
}
