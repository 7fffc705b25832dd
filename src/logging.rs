use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// `RUST_LOG` when it is set and valid, otherwise `directives`. A malformed
/// `directives` string is an error even when `RUST_LOG` would win.
pub fn build_filter(directives: &str) -> Result<EnvFilter> {
    let configured = EnvFilter::try_new(directives)
        .with_context(|| format!("SHEET_INGEST_LOG is not a valid filter: {:?}", directives))?;
    Ok(EnvFilter::try_from_default_env().unwrap_or(configured))
}

pub fn init_logging(directives: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(directives)?)
        .with(fmt::layer().with_thread_names(true))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(build_filter(DEFAULT_LOG_FILTER).is_ok());
        assert!(build_filter("warn,sheet_ingest::services=trace").is_ok());
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let err = build_filter("sheet_ingest=loud").unwrap_err();
        assert!(err.to_string().contains("SHEET_INGEST_LOG"));
    }
}
