use std::path::PathBuf;
use std::str::FromStr;

use framesync_core::{Error, FailurePolicy, Result};
use framesync_frame_tv::TrustPolicy;

/// Which sync entry point each tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Cloud to TV only, deleting from the cloud after each transfer.
    Legacy,
    /// Every ordered pair of configured endpoints.
    NWay,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "n-way" | "nway" | "all" => Ok(Self::NWay),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

pub struct Config {
    pub sync_interval_secs: u64,
    pub failure_policy: FailurePolicy,
    pub sync_mode: SyncMode,
    pub delete_after_transfer: bool,
    pub tv_host: String,
    pub tv_name: String,
    pub tv_trust: TrustPolicy,
    pub cloud_api_url: String,
    pub cloud_token: String,
    pub cloud_album: String,
    pub secret_file: PathBuf,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} must be set", key)))
        };

        let sync_interval_secs: u64 = parse(
            "FS_SYNC_INTERVAL_SECS",
            &var("FS_SYNC_INTERVAL_SECS", "300"),
        )?;
        if sync_interval_secs == 0 {
            return Err(Error::Config("FS_SYNC_INTERVAL_SECS must be positive".into()));
        }

        Ok(Self {
            sync_interval_secs,
            failure_policy: parse("FS_FAILURE_POLICY", &var("FS_FAILURE_POLICY", "isolate"))?,
            sync_mode: parse("FS_SYNC_MODE", &var("FS_SYNC_MODE", "legacy"))?,
            delete_after_transfer: parse_bool(
                "FS_DELETE_AFTER_TRANSFER",
                &var("FS_DELETE_AFTER_TRANSFER", "false"),
            )?,
            tv_host: required("FS_TV_HOST")?,
            tv_name: var("FS_TV_NAME", "framesync"),
            tv_trust: parse("FS_TV_TLS_VERIFY", &var("FS_TV_TLS_VERIFY", "false"))?,
            cloud_api_url: required("FS_CLOUD_API_URL")?,
            cloud_token: required("FS_CLOUD_TOKEN")?,
            cloud_album: required("FS_CLOUD_ALBUM")?,
            secret_file: PathBuf::from(var("FS_SECRET_FILE", "./data/secrets.json")),
            log_format: var("FS_LOG_FORMAT", "text"),
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid {}: {}", key, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("Invalid {}: '{}'", key, other))),
    }
}
