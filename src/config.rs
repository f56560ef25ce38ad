// Runtime configuration, read from the environment with sensible defaults

use std::path::PathBuf;

pub const ENV_DATABASE: &str = "BINGO_DATABASE";
pub const ENV_BIND: &str = "BINGO_BIND";
pub const ENV_STATIC_DIR: &str = "BINGO_STATIC_DIR";

pub const DEFAULT_DATABASE: &str = "bingo_cards.db";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_STATIC_DIR: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Address the HTTP server listens on
    pub bind_addr: String,
    /// Directory served for everything outside `/api`
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from(DEFAULT_DATABASE),
            bind_addr: DEFAULT_BIND.to_string(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Config {
            database_path: get(ENV_DATABASE)
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            bind_addr: get(ENV_BIND).unwrap_or(defaults.bind_addr),
            static_dir: get(ENV_STATIC_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
        }
    }
}
