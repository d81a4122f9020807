use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::FeedStreamCache;
use crate::fetcher::FetchResponse;

/// Hands a fetch response to the cached stream it belongs to.
///
/// Returns false when no stream with that id is cached any more.
pub async fn dispatch(cache: &FeedStreamCache, response: FetchResponse) -> bool {
    let Some(stream) = cache.get(response.stream_id()).await else {
        debug!(stream = %response.stream_id(), "dropping response for uncached stream");
        return false;
    };

    let mut stream = stream.write().await;
    match response {
        FetchResponse::Page { stream_id, result } => stream.receive_page(&stream_id, result),
        FetchResponse::Updates { stream_id, result } => {
            stream.receive_updates(&stream_id, result)
        }
    }
    true
}

/// Drains `responses` into the cache until every sender is gone.
pub fn spawn_dispatcher(
    cache: FeedStreamCache,
    mut responses: mpsc::Receiver<FetchResponse>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            dispatch(&cache, response).await;
        }
        info!("response channel closed; dispatcher exiting");
    })
}
