use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::FeedStreamCache;
use crate::error::PollError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn stop(self) -> Result<(), PollError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(PollError::from)
    }
}

/// Asks every cached stream to request updates once. Returns how many
/// streams were polled.
pub async fn poll_once(cache: &FeedStreamCache) -> usize {
    let streams = cache.streams().await;
    for stream in &streams {
        let stream = stream.read().await;
        debug!(stream = %stream.id(), "polling for updates");
        stream.request_updates();
    }
    streams.len()
}

/// Polls the cache for updates every `config.interval` until stopped.
pub fn spawn_update_poller(cache: FeedStreamCache, config: PollConfig) -> PollerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("update poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let polled = poll_once(&cache).await;
                    debug!(polled, "update poll round finished");
                }
            }
        }
    });

    PollerHandle { cancel_tx, join }
}
