use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::env as env_util;

pub const DEFAULT_DATABASE: &str = "acedatacloud_platform";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_OUTPUT_DIR: &str = "data";

/// Aliases that never appear on the public status page (internal or retired services).
pub const EXCLUDED_ALIASES: &[&str] = &[
    "hcaptcha",
    "recaptcha",
    "face_change",
    "identity",
    "adsl_http_proxy",
    "shorturl",
    "localization",
    "image2text",
    "chatdoc",
    "tw",
    "producer",
    "drawai",
    "fish",
    "qrart",
    "riffusion",
];

pub fn is_excluded_alias(alias: &str) -> bool {
    EXCLUDED_ALIASES.contains(&alias)
}

/// Postgres connection parameters. `Debug` redacts the password.
#[derive(Clone)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
}

impl fmt::Debug for PgSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

impl PgSettings {
    /// Reads PGSQL_HOST / PGSQL_PORT / PGSQL_USER / PGSQL_PASSWORD / PGSQL_DATABASE.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_util::env_req("PGSQL_HOST")?,
            port: env_util::env_parse("PGSQL_PORT", DEFAULT_PORT)?,
            user: env_util::env_req("PGSQL_USER")?,
            password: env_util::env_req("PGSQL_PASSWORD")?,
            database: env_util::env_or("PGSQL_DATABASE", DEFAULT_DATABASE),
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(120),
        })
    }
}

/// How a window's report is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSource {
    /// Raw usage rows grouped into fixed-width slots.
    Bucketed { bucket_minutes: u32, slots: u32 },
    /// Rows from the pre-aggregated daily uptime table.
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub days: u32,
    pub granularity: &'static str,
    pub min_requests: i64,
    pub source: WindowSource,
}

impl WindowSpec {
    pub fn file_name(&self) -> String {
        format!("status_{}.json", self.days)
    }
}

pub const WINDOWS: [WindowSpec; 4] = [
    WindowSpec {
        days: 1,
        granularity: "quarter",
        min_requests: 3,
        source: WindowSource::Bucketed { bucket_minutes: 15, slots: 96 },
    },
    WindowSpec {
        days: 7,
        granularity: "2hour",
        min_requests: 16,
        source: WindowSource::Bucketed { bucket_minutes: 120, slots: 84 },
    },
    WindowSpec {
        days: 30,
        granularity: "8hour",
        min_requests: 70,
        source: WindowSource::Bucketed { bucket_minutes: 480, slots: 90 },
    },
    WindowSpec {
        days: 90,
        granularity: "daily",
        min_requests: 200,
        source: WindowSource::Daily,
    },
];

/// Picks the requested windows in canonical order; an empty request selects all.
pub fn select_windows(requested: &[u32]) -> Result<Vec<WindowSpec>> {
    for days in requested {
        if !WINDOWS.iter().any(|w| w.days == *days) {
            bail!("unsupported window {days}; expected one of 1, 7, 30, 90");
        }
    }
    Ok(WINDOWS
        .iter()
        .filter(|w| requested.is_empty() || requested.contains(&w.days))
        .copied()
        .collect())
}

#[derive(Debug, Clone)]
pub struct StatusConfig {
    pub db: PgSettings,
    pub output_dir: PathBuf,
    pub windows: Vec<WindowSpec>,
}

impl StatusConfig {
    /// Resolves everything up front so configuration errors surface before any connection.
    pub fn from_env(output_dir: Option<PathBuf>, requested_windows: &[u32]) -> Result<Self> {
        let windows = select_windows(requested_windows)?;
        let output_dir = output_dir
            .or_else(|| env_util::env_opt("STATUS_OUTPUT_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        Ok(Self {
            db: PgSettings::from_env()?,
            output_dir,
            windows,
        })
    }
}
