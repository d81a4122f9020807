use thiserror::Error;

use crate::model::PostIdentity;

/// Misconfiguration detected while building a stream.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("supply a feed stream spec")]
    MissingSpec,
    #[error("feed stream spec is missing id")]
    MissingId,
    #[error("feed stream spec is missing fetcher")]
    MissingFetcher,
    #[error("feed stream spec is missing keyMaker")]
    MissingKeyMaker,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{identity} is not in stream {stream}")]
    PostNotInStream {
        stream: String,
        identity: PostIdentity,
    },
    #[error("unknown stream id: {0}")]
    UnknownStream(String),
    #[error(transparent)]
    Spec(#[from] SpecError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no endpoint for stream {0}")]
    Unroutable(String),
    #[error("no async runtime to run the request on")]
    NoRuntime,
    #[error("request channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("could not locate a configuration directory")]
    NoConfigDir,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
