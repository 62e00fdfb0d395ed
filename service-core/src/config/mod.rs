use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::time::Duration;

/// Settings shared by every service binary.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_write_timeout_secs() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Upper bound on a single request, reading the body and writing the reply.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs + self.write_timeout_secs)
    }
}
