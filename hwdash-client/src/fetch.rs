use http::Uri;
use hwdash_proto::{HardwareSnapshot, envelope};
use log::warn;

use crate::{
    config::{Conf, QueryCommand},
    store::SnapshotSource,
    transport,
};

/// Read-only client for the latest published snapshot.
///
/// Issues exactly one request per call, no caching and no retries. A failed
/// poll is simply absent data until the caller polls again.
pub struct MetricsFetcher {
    base_url: String,
    token: String,
    key: String,
    command: QueryCommand,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed with status {status}")]
    Status { status: u16 },
    #[error("transport failure: {0}")]
    Transport(anyhow::Error),
    #[error("undecodable response: {0}")]
    Decode(#[from] envelope::DecodeError),
}

impl MetricsFetcher {
    pub fn new(conf: &Conf) -> Self {
        Self {
            base_url: conf.redis_url.trim_end_matches('/').to_owned(),
            token: conf.redis_token.clone(),
            key: conf.metrics_key.clone(),
            command: conf.command,
        }
    }

    fn command_uri(&self) -> Result<Uri, FetchError> {
        let url = match self.command {
            QueryCommand::Get => format!("{}/get/{}", self.base_url, self.key),
            QueryCommand::XRevRange => {
                format!("{}/xrevrange/{}/+/-/COUNT/1", self.base_url, self.key)
            }
        };

        url.parse()
            .map_err(|e: http::uri::InvalidUri| FetchError::Transport(e.into()))
    }

    async fn try_latest(&self) -> Result<Option<HardwareSnapshot>, FetchError> {
        let req = transport::bearer_get_request(self.command_uri()?, &self.token)
            .map_err(FetchError::Transport)?;
        let resp = transport::send_request(req)
            .await
            .map_err(FetchError::Transport)?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
            });
        }

        Ok(envelope::decode_latest(resp.body())?)
    }

    /// Fetch the most recent snapshot, or nothing.
    ///
    /// Every failure mode (network, non-success status, undecodable envelope
    /// or payload) collapses into `None`; the reason only reaches the log.
    pub async fn fetch_latest(&self) -> Option<HardwareSnapshot> {
        match self.try_latest().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("failed to fetch metrics: {e}");
                None
            }
        }
    }
}

impl SnapshotSource for MetricsFetcher {
    async fn latest(&self) -> anyhow::Result<Option<HardwareSnapshot>> {
        Ok(self.fetch_latest().await)
    }
}
