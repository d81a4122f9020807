use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use feed_stream_core::{
    spawn_dispatcher, spawn_update_poller, FeedStreamCache, FeedStreamConfig, HttpFetcher,
    SharedFeedStream, StreamFactory,
};
use reqwest::{redirect, ClientBuilder};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Follow one reader stream and log what arrives.
#[derive(Debug, Parser)]
#[command(name = "feed-stream-tail", version)]
struct Args {
    /// Stream id, e.g. `following`, `conversations`, `tag:rust`, `feed:42`.
    stream_id: String,

    /// Overrides the API base url from the configuration file.
    #[arg(long)]
    base_url: Option<String>,

    /// Configuration file to use instead of the per-user one.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FeedStreamConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => FeedStreamConfig::load(),
    };
    if let Some(base_url) = args.base_url {
        config.api.base_url = base_url;
    }

    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(concat!("feed-stream-tail/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let (response_tx, response_rx) = mpsc::channel(64);
    let fetcher = HttpFetcher::new(client, &config.api, response_tx)
        .context("invalid API configuration")?;
    let cache = FeedStreamCache::new();
    let factory = StreamFactory::new(cache.clone(), Arc::new(fetcher))
        .with_page_size(config.streams.page_size);
    let dispatcher = spawn_dispatcher(cache.clone(), response_rx);

    let stream = factory
        .stream(&args.stream_id)
        .await
        .with_context(|| format!("cannot follow {}", args.stream_id))?;
    stream.write().await.fetch_next_page();

    let poll_config = config.streams.poll_config();
    let poller = spawn_update_poller(cache, poll_config);

    let mut report = tokio::time::interval(Duration::from_secs(1).max(poll_config.interval / 2));
    let mut report_state = ReportState::default();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = report.tick() => report_stream(&stream, &mut report_state).await,
        }
    }

    poller.stop().await?;
    dispatcher.abort();
    Ok(())
}

/// What the report loop has already logged.
#[derive(Debug, Default)]
struct ReportState {
    first_page_shown: bool,
    last_error: Option<String>,
}

impl ReportState {
    /// Returns `error` when it differs from the one logged last.
    fn new_error<'a>(&mut self, error: Option<&'a str>) -> Option<&'a str> {
        if self.last_error.as_deref() == error {
            return None;
        }
        self.last_error = error.map(str::to_owned);
        error
    }
}

/// Logs the window once the first page is in, then every merged update set.
async fn report_stream(stream: &SharedFeedStream, state: &mut ReportState) {
    let mut stream = stream.write().await;
    if let Some(error) = state.new_error(stream.last_error()) {
        warn!(stream = %stream.id(), %error, "last request failed");
    }

    let merged = stream.show_updates();
    let page_arrived = !state.first_page_shown && !stream.is_fetching() && !stream.get().is_empty();
    if merged == 0 && !page_arrived {
        return;
    }
    state.first_page_shown = true;

    info!(stream = %stream.id(), merged, total = stream.get().len(), "stream window");
    for key in stream.get() {
        info!(
            post = %key.identity(),
            date = ?key.sort_date(),
            comments = key.comments.len(),
            "post"
        );
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
