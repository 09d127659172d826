use std::{fs, path::Path};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// Used for deserializing user-provided config files where all fields are optional.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub db_url: Option<String>,
    pub log_level: Option<String>,
}

impl PartialConfig {
    /// Merges the fields of this partial config into a final config, overwriting existing values.
    fn merge_into(self, final_config: &mut FinalConfig) {
        if let Some(host) = self.host {
            final_config.host = host;
        }
        if let Some(port) = self.port {
            final_config.port = port;
        }
        if let Some(base_path) = self.base_path {
            final_config.base_path = base_path;
        }
        if let Some(db_url) = self.db_url {
            final_config.db_url = db_url;
        }
        if let Some(log_level) = self.log_level {
            final_config.log_level = log_level;
        }
    }
}

// The fully resolved configuration used by the application.
#[derive(Debug, Deserialize, Serialize)]
pub struct FinalConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub db_url: String,
    pub log_level: String,
}

fn get_env_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn get_config_from_env() -> PartialConfig {
    // MYSQL_DSN wins over SQLITE_PATH wins over DB_URL; a plain path means SQLite.
    let db_url = get_env_var::<String>("MYSQL_DSN")
        .or_else(|| get_env_var("SQLITE_PATH"))
        .or_else(|| get_env_var("DB_URL"));
    PartialConfig {
        host: get_env_var("HOST"),
        port: get_env_var("PORT"),
        base_path: get_env_var("BASE_PATH"),
        db_url,
        log_level: get_env_var("LOG_LEVEL"),
    }
}

pub static CONFIG: Lazy<FinalConfig> = Lazy::new(|| {
    let user_config_path = Path::new("config.yaml");

    let mut final_config = FinalConfig {
        host: "0.0.0.0".to_string(),
        port: 3000,
        base_path: "".to_string(),
        db_url: "./storage/relay-hub.db".to_string(),
        log_level: "info".to_string(),
    };

    // Load the user's config if it exists. It's optional and overrides the defaults.
    if user_config_path.exists() {
        if let Ok(config_str) = fs::read_to_string(user_config_path) {
            let user_config: PartialConfig = serde_yaml::from_str(&config_str)
                .unwrap_or_else(|e| {
                    panic!(
                        "Failed to parse configuration file at {:?}: {}",
                        user_config_path, e
                    )
                });
            user_config.merge_into(&mut final_config);
        }
    }

    // Environment variables have the highest priority.
    get_config_from_env().merge_into(&mut final_config);

    final_config
});
