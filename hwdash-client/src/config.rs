use confique::Config;
use serde::Deserialize;

/// REST command used to read the latest snapshot.
///
/// The producer switched from a plain key write to a stream append at some
/// point, so both command forms stay supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryCommand {
    /// Single-value key read (`GET key`).
    Get,
    /// Newest stream entry (`XREVRANGE key + - COUNT 1`).
    XRevRange,
}

/// Provenance of `last_update` after a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LastUpdateMode {
    /// The producer's embedded timestamp, converted from epoch seconds.
    SnapshotTimestamp,
    /// The wall-clock time of the refresh call.
    WallClock,
}

#[derive(Config, Debug)]
pub struct Conf {
    /// Base URL of the REST endpoint
    #[config(env = "UPSTASH_REDIS_URL")]
    pub redis_url: String,

    /// Access token, sent as a bearer credential
    #[config(env = "UPSTASH_REDIS_TOKEN")]
    pub redis_token: String,

    /// Key or stream holding the latest snapshot
    #[config(default = "hardware:metrics")]
    pub metrics_key: String,

    /// Command used to read the snapshot
    #[config(default = "x-rev-range")]
    pub command: QueryCommand,

    /// Where `last_update` comes from
    #[config(default = "snapshot-timestamp")]
    pub last_update: LastUpdateMode,

    /// Seconds between two polls of the driver loop
    #[config(default = 5)]
    pub poll_interval: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Resolve configuration from the environment plus an optional TOML file.
///
/// A missing endpoint or credential is fatal here, before any component is
/// constructed.
pub fn load(path: &str) -> Result<Conf, ConfigError> {
    let conf = Conf::builder().env().file(path).load()?;
    conf.validate()?;
    Ok(conf)
}

impl Conf {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.trim().is_empty() {
            return Err(ConfigError::Invalid("redis_url must not be empty"));
        }
        if !(self.redis_url.starts_with("http://") || self.redis_url.starts_with("https://")) {
            return Err(ConfigError::Invalid("redis_url must be an http(s) URL"));
        }
        if self.redis_token.trim().is_empty() {
            return Err(ConfigError::Invalid("redis_token must not be empty"));
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::Invalid("poll_interval must be at least 1s"));
        }
        Ok(())
    }
}
