use crate::error::WordleError;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub loglevel: String,
    pub max_connections: u32,
    /// Print the schema metadata as JSON after applying it.
    pub dump_schema: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/wordle.db".to_string(),
            loglevel: "info".to_string(),
            max_connections: 5,
            dump_schema: false,
        }
    }
}

impl Config {
    /// Defaults overlaid with `WORDLE_*` environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::prefixed("WORDLE_"))
    }

    pub fn load() -> Result<Self, WordleError> {
        Ok(Self::figment().extract()?)
    }
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| {
        eprintln!("invalid configuration, falling back to defaults: {e}");
        Config::default()
    })
});
