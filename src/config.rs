use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Backend used when `API_URL` is unset outside production.
pub const DEV_API_URL: &str = "http://localhost:8000";
/// Backend used when `API_URL` is unset and `APP_ENV=production`.
pub const PROD_API_URL: &str = "https://your-backend-url.onrender.com";

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the attendance backend, without a trailing slash.
    pub api_base_url: String,
    /// Delay between two QR polls. Must stay below the server's validity window.
    pub poll_interval: Duration,
    /// Attempts per QR fetch before the failure is surfaced.
    pub max_retries: u32,
    /// Fixed delay between two attempts of the same fetch.
    pub retry_delay: Duration,
    /// Timeout for QR generation and attendance submission requests.
    pub http_timeout: Duration,
    /// Timeout for the session status check.
    pub status_timeout: Duration,
    /// Seconds added to the computed remaining time before clamping.
    pub countdown_buffer_secs: i64,
    /// How long the success message stays up before the flow moves on.
    pub success_redirect: Duration,
    /// Listen address of the kiosk display server.
    pub kiosk_addr: SocketAddr,
    /// Where the auth context persists the student id.
    pub auth_store_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEV_API_URL.to_string(),
            poll_interval: Duration::from_secs(120),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            http_timeout: Duration::from_secs(15),
            status_timeout: Duration::from_secs(5),
            countdown_buffer_secs: 0,
            success_redirect: Duration::from_millis(2000),
            kiosk_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            auth_store_path: default_auth_store_path(),
        }
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a `Config` from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let is_production = lookup("APP_ENV").as_deref() == Some("production");
        let api_base_url = lookup("API_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                if is_production {
                    PROD_API_URL.to_string()
                } else {
                    DEV_API_URL.to_string()
                }
            })
            .trim_end_matches('/')
            .to_string();

        let poll_secs: u64 = parse_or(&lookup, "QR_POLL_INTERVAL_SECS", 120)?;
        if poll_secs == 0 {
            anyhow::bail!("QR_POLL_INTERVAL_SECS must be greater than zero");
        }

        let max_retries: u32 = parse_or(&lookup, "QR_MAX_RETRIES", defaults.max_retries)?;
        if max_retries == 0 {
            anyhow::bail!("QR_MAX_RETRIES must be at least 1");
        }

        let kiosk_addr = match lookup("KIOSK_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid KIOSK_ADDR: {raw}"))?,
            None => defaults.kiosk_addr,
        };

        Ok(Self {
            api_base_url,
            poll_interval: Duration::from_secs(poll_secs),
            max_retries,
            retry_delay: Duration::from_millis(parse_or(&lookup, "QR_RETRY_DELAY_MS", 1000)?),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 15)?),
            status_timeout: Duration::from_secs(parse_or(&lookup, "STATUS_TIMEOUT_SECS", 5)?),
            countdown_buffer_secs: parse_or(&lookup, "COUNTDOWN_BUFFER_SECS", 0)?,
            success_redirect: Duration::from_millis(parse_or(&lookup, "SUCCESS_REDIRECT_MS", 2000)?),
            kiosk_addr,
            auth_store_path: lookup("AUTH_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.auth_store_path),
        })
    }

    /// Joins an endpoint path onto the backend base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {key}: {raw}")),
        None => Ok(default),
    }
}

fn default_auth_store_path() -> PathBuf {
    if let Some(pd) = ProjectDirs::from("", "", "rollcall") {
        pd.data_dir().join("auth.json")
    } else {
        PathBuf::from("rollcall_auth.json")
    }
}
