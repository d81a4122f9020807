use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ConfigError, FetchError};
use crate::factory::StreamKind;
use crate::model::{Page, UpdatePayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub number: usize,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
}

impl RequestOptions {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            before: None,
            after: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Page {
        stream_id: String,
        page_handle: Option<String>,
        options: RequestOptions,
    },
    Updates {
        stream_id: String,
        options: RequestOptions,
    },
}

impl FetchRequest {
    pub fn stream_id(&self) -> &str {
        match self {
            FetchRequest::Page { stream_id, .. } | FetchRequest::Updates { stream_id, .. } => {
                stream_id
            }
        }
    }
}

/// Outcome of a [`FetchRequest`], routed back to the stream with the same id.
#[derive(Debug)]
pub enum FetchResponse {
    Page {
        stream_id: String,
        result: Result<Page, FetchError>,
    },
    Updates {
        stream_id: String,
        result: Result<UpdatePayload, FetchError>,
    },
}

impl FetchResponse {
    pub fn failed(request: FetchRequest, error: FetchError) -> Self {
        match request {
            FetchRequest::Page { stream_id, .. } => FetchResponse::Page {
                stream_id,
                result: Err(error),
            },
            FetchRequest::Updates { stream_id, .. } => FetchResponse::Updates {
                stream_id,
                result: Err(error),
            },
        }
    }

    pub fn stream_id(&self) -> &str {
        match self {
            FetchResponse::Page { stream_id, .. } | FetchResponse::Updates { stream_id, .. } => {
                stream_id
            }
        }
    }
}

/// Starts a request for a stream. The answer arrives later, out of band.
///
/// An `Err` means the request was never started and no response will follow.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> Result<(), FetchError>;
}

impl<F> Fetcher for F
where
    F: Fn(FetchRequest) + Send + Sync,
{
    fn fetch(&self, request: FetchRequest) -> Result<(), FetchError> {
        self(request);
        Ok(())
    }
}

/// Forwards every request to a channel without performing it.
#[derive(Debug, Clone)]
pub struct ChannelFetcher {
    tx: mpsc::UnboundedSender<FetchRequest>,
}

impl ChannelFetcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FetchRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Fetcher for ChannelFetcher {
    fn fetch(&self, request: FetchRequest) -> Result<(), FetchError> {
        self.tx.send(request).map_err(|_| FetchError::ChannelClosed)
    }
}

/// Fetcher backed by the reader REST API.
///
/// Each request runs on its own task; responses are sent to `response_tx`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    timeout: Duration,
    retry_attempts: u8,
    retry_backoff: Duration,
    response_tx: mpsc::Sender<FetchResponse>,
}

impl HttpFetcher {
    pub fn new(
        client: Client,
        api: &ApiConfig,
        response_tx: mpsc::Sender<FetchResponse>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            base_url: api.base_url()?,
            timeout: api.request_timeout(),
            retry_attempts: api.retry_attempts,
            retry_backoff: Duration::from_millis(api.retry_backoff_ms),
            response_tx,
        })
    }

    /// Performs `request` on the current task and returns its response.
    pub async fn execute(&self, request: FetchRequest) -> FetchResponse {
        match request {
            FetchRequest::Page {
                stream_id,
                page_handle,
                options,
            } => {
                let result = self
                    .get_json::<Page>(&stream_id, page_handle.as_deref(), &options)
                    .await;
                FetchResponse::Page { stream_id, result }
            }
            FetchRequest::Updates { stream_id, options } => {
                let result = self
                    .get_json::<UpdatePayload>(&stream_id, None, &options)
                    .await;
                FetchResponse::Updates { stream_id, result }
            }
        }
    }

    fn request_url(
        &self,
        stream_id: &str,
        page_handle: Option<&str>,
        options: &RequestOptions,
    ) -> Result<Url, FetchError> {
        let kind = StreamKind::parse(stream_id)
            .map_err(|_| FetchError::Unroutable(stream_id.to_owned()))?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Unroutable(stream_id.to_owned()))?
            .pop_if_empty()
            .extend(kind.path_segments());
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in kind.query() {
                query.append_pair(name, &value);
            }
            query.append_pair("number", &options.number.to_string());
            if let Some(handle) = page_handle {
                query.append_pair("page_handle", handle);
            }
            if let Some(before) = options.before {
                query.append_pair("before", &before.to_rfc3339());
            }
            if let Some(after) = options.after {
                query.append_pair("after", &after.to_rfc3339());
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        stream_id: &str,
        page_handle: Option<&str>,
        options: &RequestOptions,
    ) -> Result<T, FetchError> {
        let url = self.request_url(stream_id, page_handle, options)?;
        let body = self.get_with_retries(&url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_with_retries(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempt: u8 = 0;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt < self.retry_attempts => {
                    attempt += 1;
                    warn!(url = %url, attempt, error = %err, "request failed, retrying");
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Linear backoff, capped instead of overflowing.
    fn backoff_for(&self, attempt: u8) -> Duration {
        self.retry_backoff.saturating_mul(u32::from(attempt))
    }

    async fn get_once(&self, url: &Url) -> Result<Vec<u8>, reqwest::Error> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: FetchRequest) -> Result<(), FetchError> {
        let handle = Handle::try_current().map_err(|_| FetchError::NoRuntime)?;
        debug!(stream = %request.stream_id(), "spawning request");

        let fetcher = self.clone();
        handle.spawn(async move {
            let response = fetcher.execute(request).await;
            if let Err(err) = response_result(&response) {
                warn!(stream = %response.stream_id(), error = %err, "fetch failed");
            }
            if fetcher.response_tx.send(response).await.is_err() {
                warn!("response receiver dropped");
            }
        });
        Ok(())
    }
}

fn response_result(response: &FetchResponse) -> Result<(), &FetchError> {
    match response {
        FetchResponse::Page { result, .. } => result.as_ref().map(|_| ()),
        FetchResponse::Updates { result, .. } => result.as_ref().map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closures_are_fetchers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let fetcher = move |request: FetchRequest| sink.lock().unwrap().push(request);

        fetcher
            .fetch(FetchRequest::Updates {
                stream_id: "following".into(),
                options: RequestOptions::new(5),
            })
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn request_url_carries_endpoint_and_paging() {
        let (tx, _rx) = mpsc::channel(1);
        let api = ApiConfig {
            base_url: "https://api.example.com/rest/v1.2".into(),
            ..ApiConfig::default()
        };
        let fetcher = HttpFetcher::new(Client::new(), &api, tx).unwrap();

        let url = fetcher
            .request_url("tag:rust", Some("abc"), &RequestOptions::new(7))
            .unwrap();
        assert_eq!(url.path(), "/rest/v1.2/read/tags/rust/posts");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("number".into(), "7".into())));
        assert!(query.contains(&("page_handle".into(), "abc".into())));

        assert!(matches!(
            fetcher.request_url("nonsense", None, &RequestOptions::new(1)),
            Err(FetchError::Unroutable(_))
        ));
    }

    fn fetcher_for(api: ApiConfig) -> HttpFetcher {
        let (tx, _rx) = mpsc::channel(1);
        HttpFetcher::new(Client::new(), &api, tx).unwrap()
    }

    #[test]
    fn slugs_cannot_leave_their_endpoint() {
        let fetcher = fetcher_for(ApiConfig {
            base_url: "https://api.example.com/rest/v1.2/".into(),
            ..ApiConfig::default()
        });

        let url = fetcher
            .request_url("tag:../../x", None, &RequestOptions::new(7))
            .unwrap();
        assert_eq!(url.path(), "/rest/v1.2/read/tags/..%2F..%2Fx/posts");

        let url = fetcher
            .request_url("list:me/a?b#c", None, &RequestOptions::new(7))
            .unwrap();
        assert_eq!(url.path(), "/rest/v1.2/read/list/me/a%3Fb%23c/posts");
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let fetcher = fetcher_for(ApiConfig {
            retry_backoff_ms: u64::MAX,
            ..ApiConfig::default()
        });
        assert_eq!(fetcher.backoff_for(0), Duration::ZERO);
        assert_eq!(fetcher.backoff_for(u8::MAX), Duration::MAX);

        let fetcher = fetcher_for(ApiConfig {
            retry_backoff_ms: 500,
            ..ApiConfig::default()
        });
        assert_eq!(fetcher.backoff_for(3), Duration::from_millis(1500));
    }

    #[test]
    fn fetch_outside_a_runtime_is_refused() {
        let (tx, mut rx) = mpsc::channel(1);
        let fetcher = HttpFetcher::new(Client::new(), &ApiConfig::default(), tx).unwrap();
        let result = fetcher.fetch(FetchRequest::Updates {
            stream_id: "following".into(),
            options: RequestOptions::new(5),
        });
        assert!(matches!(result, Err(FetchError::NoRuntime)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_fetcher_reports_a_closed_receiver() {
        let (fetcher, requests) = ChannelFetcher::new();
        drop(requests);
        let result = fetcher.fetch(FetchRequest::Updates {
            stream_id: "following".into(),
            options: RequestOptions::new(5),
        });
        assert!(matches!(result, Err(FetchError::ChannelClosed)));
    }
}
