use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::logging::DEFAULT_LOG_FILTER;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

fn default_max_upload_bytes() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub max_upload_bytes: usize,
    /// Per-run limit on the load phase; unlimited when unset.
    pub ingest_timeout: Option<Duration>,
    /// Default `tracing` filter directives, used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let addr = std::env::var("SHEET_INGEST_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("SHEET_INGEST_ADDR is not a socket address")?;

        let max_upload_bytes = match std::env::var("SHEET_INGEST_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .parse::<usize>()
                .context("SHEET_INGEST_MAX_UPLOAD_BYTES is not a byte count")?,
            Err(_) => default_max_upload_bytes(),
        };

        let ingest_timeout = match std::env::var("SHEET_INGEST_DEADLINE_SECS") {
            Ok(raw) => Some(Duration::from_secs(
                raw.parse::<u64>()
                    .context("SHEET_INGEST_DEADLINE_SECS is not a number of seconds")?,
            )),
            Err(_) => None,
        };

        let log_filter = std::env::var("SHEET_INGEST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            addr,
            max_upload_bytes,
            ingest_timeout,
            log_filter,
        })
    }
}
