// The diesel table definitions in sqlite.rs / mysql.rs are pulled into
// `database` via #[path] so each backend model module sees its own schema.
pub mod enum_def;
