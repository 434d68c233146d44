use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::FixedOffset;

/// Runtime configuration read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub local_store_path: PathBuf,
    pub utc_offset: FixedOffset,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: std::env::var("DATABASE_URL").ok(),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse::<u32>()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?,
            local_store_path: std::env::var("LOCAL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/local-store.json")),
            utc_offset: parse_offset(
                &std::env::var("GROUP_UTC_OFFSET").unwrap_or_else(|_| "+09:00".to_string()),
            )?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to the group's Postgres instance")
    }
}

/// Parses `+09:00`, `-05:30` or `Z`.
pub fn parse_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value == "UTC" {
        return FixedOffset::east_opt(0).context("invalid UTC offset");
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => anyhow::bail!("GROUP_UTC_OFFSET must look like +09:00, got '{value}'"),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .with_context(|| format!("GROUP_UTC_OFFSET must look like +09:00, got '{value}'"))?;
    let hours: i32 = hours.parse().context("invalid offset hours")?;
    let minutes: i32 = minutes.parse().context("invalid offset minutes")?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("offset out of range: '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_and_negative_offsets() {
        assert_eq!(parse_offset("+09:00").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(
            parse_offset("-05:30").unwrap().local_minus_utc(),
            -(5 * 3600 + 30 * 60)
        );
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_malformed_offsets() {
        assert!(parse_offset("0900").is_err());
        assert!(parse_offset("+9").is_err());
        assert!(parse_offset("+25:00").is_err());
    }
}
