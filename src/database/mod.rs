use std::fs::File;
use std::path::Path;

use diesel::{
    r2d2::{ConnectionManager, Pool, PooledConnection},
    Connection, MysqlConnection, SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::config::CONFIG;
use crate::controller::ApiError;

pub mod ability;
pub mod channel;
pub mod log;
pub mod option;
pub mod token;
pub mod user;

pub enum DbType {
    Mysql,
    Sqlite,
}

pub enum DbPool {
    Mysql(Pool<ConnectionManager<MysqlConnection>>),
    Sqlite(Pool<ConnectionManager<SqliteConnection>>),
}

pub enum DbConnection {
    Mysql(PooledConnection<ConnectionManager<MysqlConnection>>),
    Sqlite(PooledConnection<ConnectionManager<SqliteConnection>>),
}

/// Establishes the pool and runs pending migrations at startup instead of on
/// the first request.
pub fn init() {
    Lazy::force(&DB_POOL);
}

pub fn get_connection() -> DbConnection {
    match &*DB_POOL {
        DbPool::Mysql(pool) => DbConnection::Mysql(pool.get().unwrap()),
        DbPool::Sqlite(pool) => DbConnection::Sqlite(pool.get().unwrap()),
    }
}

fn parse_db_type(db_url: &str) -> DbType {
    if db_url.starts_with("mysql") {
        DbType::Mysql
    } else {
        DbType::Sqlite
    }
}

impl DbPool {
    pub fn establish() -> Self {
        let db_url = &CONFIG.db_url;
        match parse_db_type(db_url) {
            DbType::Mysql => DbPool::Mysql(init_mysql_pool(db_url)),
            DbType::Sqlite => DbPool::Sqlite(init_sqlite_pool(db_url)),
        }
    }
}

#[path = "../schema/sqlite.rs"]
pub mod _sqlite_schema;

#[path = "../schema/mysql.rs"]
pub mod _mysql_schema;

/// Declares a plain model struct plus per-backend `<Name>Db` twins carrying the
/// diesel derives, so the same query block can run against either schema.
#[macro_export]
macro_rules! db_object {
    (
        $(
            $( #[$attr:meta] )*
            pub struct $name:ident {
                $( $( #[$field_attr:meta] )* $vis:vis $field:ident : $typ:ty ),+
                $(,)?
            }
        )+
    ) => {
        $(
            #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
            pub struct $name { $( $vis $field : $typ, )+ }
        )+

        pub mod _mysql_model {
            $( $crate::db_object! { @expand mysql |  $( #[$attr] )* | $name |  $( $( #[$field_attr] )* $field : $typ ),+ } )+
        }
        pub mod _sqlite_model {
            $( $crate::db_object! { @expand sqlite |  $( #[$attr] )* | $name |  $( $( #[$field_attr] )* $field : $typ ),+ } )+
        }
    };
    ( @expand $db_type:ident | $( #[$attr:meta] )* | $name:ident | $( $( #[$field_attr:meta] )* $vis:vis $field:ident : $typ:ty),+) => {
        paste::paste! {
            #[allow(unused_imports)] use super::*;
            #[allow(unused_imports)] use $crate::database::[<_ $db_type _schema>]::*;
            #[allow(unused_imports)] use diesel::prelude::*;

            $( #[$attr] )*
            pub struct [<$name Db>] { $(
                $( #[$field_attr] )* $vis $field : $typ,
            )+ }

            impl [<$name Db>] {
                #[inline(always)]
                pub fn from_db(self) -> super::$name {
                    super::$name { $( $field: self.$field, )+ }
                }

                #[inline(always)]
                pub fn to_db(x: &super::$name) -> Self {
                    Self {
                        $( $field: x.$field.clone(), )+
                    }
                }
            }
        }
    }
}

/// Runs a query block against whichever backend the pool was built for. The
/// block sees the backend's schema and `_<backend>_model` types under the same
/// names, so it must stick to operations both backends support (no RETURNING).
#[macro_export]
macro_rules! db_execute {
    ($conn:ident, $block:block) => {
        match $conn {
            $crate::database::DbConnection::Mysql($conn) => {
                use $crate::database::_mysql_schema::*;
                #[allow(unused_imports)]
                use _mysql_model::*;
                #[allow(unused_imports)]
                use diesel::prelude::*;

                $block
            }
            $crate::database::DbConnection::Sqlite($conn) => {
                use $crate::database::_sqlite_schema::*;
                #[allow(unused_imports)]
                use _sqlite_model::*;
                #[allow(unused_imports)]
                use diesel::prelude::*;

                $block
            }
        }
    };
}

static DB_POOL: Lazy<DbPool> = Lazy::new(DbPool::establish);
const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");
const MYSQL_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/mysql");

fn init_sqlite_pool(db_url: &str) -> Pool<ConnectionManager<SqliteConnection>> {
    let db_path = Path::new(db_url);
    if !db_path.exists() {
        if let Some(parent_dir) = db_path.parent() {
            if !parent_dir.exists() {
                std::fs::create_dir_all(parent_dir).expect("failed to create database directory");
            }
        }
        File::create(db_path).expect("failed to create database file");
    }

    let mut connection =
        SqliteConnection::establish(db_url).expect("failed to establish migration connection");
    connection
        .run_pending_migrations(SQLITE_MIGRATIONS)
        .expect("failed to run migrations");

    let manager = ConnectionManager::<SqliteConnection>::new(db_url);
    Pool::builder()
        .test_on_check_out(true)
        .max_size(5)
        .build(manager)
        .expect("Failed to create pool.")
}

fn init_mysql_pool(db_url: &str) -> Pool<ConnectionManager<MysqlConnection>> {
    let mut connection =
        MysqlConnection::establish(db_url).expect("failed to establish migration connection");
    connection
        .run_pending_migrations(MYSQL_MIGRATIONS)
        .expect("failed to run migrations");

    let manager = ConnectionManager::<MysqlConnection>::new(db_url);
    Pool::builder()
        .max_size(10)
        .build(manager)
        .expect("Failed to create pool.")
}

pub type DbResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct ListResult<T> {
    pub total: i64,
    pub list: Vec<T>,
}
