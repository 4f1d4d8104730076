use anyhow::{anyhow, Result};
use std::env;

pub const DEFAULT_DATABASE: &str = "db.sqlite";
pub const DEFAULT_LOG_FILE: &str = "log.txt";

/// Credentials of the registered Untappd application.
#[derive(Debug, Clone)]
pub struct UntappdCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Runtime configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub untappd: Option<UntappdCredentials>,
    pub database: String,
    pub log_file: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let client_id = env::var("UNTAPPD_CLIENT_ID").ok();
        let client_secret = env::var("UNTAPPD_CLIENT_SECRET").ok();
        let untappd = match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Some(UntappdCredentials {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "UNTAPPD_CLIENT_ID and UNTAPPD_CLIENT_SECRET must be set together"
                ))
            }
        };

        Ok(Self {
            untappd,
            database: env::var("STRINKS_DB").unwrap_or_else(|_| DEFAULT_DATABASE.to_string()),
            log_file: env::var("STRINKS_LOG_FILE")
                .unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string()),
        })
    }
}
