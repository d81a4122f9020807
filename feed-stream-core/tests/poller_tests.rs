use std::sync::Arc;
use std::time::Duration;

use feed_stream_core::{
    poll_once, spawn_update_poller, ChannelFetcher, FeedStreamCache, FetchRequest, PollConfig,
    StreamFactory,
};

#[tokio::test]
async fn poll_once_requests_updates_for_every_stream() {
    let (fetcher, mut requests) = ChannelFetcher::new();
    let cache = FeedStreamCache::new();
    let factory = StreamFactory::new(cache.clone(), Arc::new(fetcher));
    factory.stream("following").await.unwrap();
    factory.stream("tag:rust").await.unwrap();

    assert_eq!(poll_once(&cache).await, 2);

    let mut polled = Vec::new();
    while let Ok(request) = requests.try_recv() {
        match request {
            FetchRequest::Updates { stream_id, .. } => polled.push(stream_id),
            other => panic!("unexpected request {other:?}"),
        }
    }
    polled.sort();
    assert_eq!(polled, vec!["following", "tag:rust"]);
}

#[tokio::test]
async fn spawned_poller_ticks_until_stopped() {
    let (fetcher, mut requests) = ChannelFetcher::new();
    let cache = FeedStreamCache::new();
    let factory = StreamFactory::new(cache.clone(), Arc::new(fetcher));
    factory.stream("likes").await.unwrap();

    let handle = spawn_update_poller(
        cache,
        PollConfig {
            interval: Duration::from_millis(20),
        },
    );

    let request = tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(request.stream_id(), "likes");

    handle.stop().await.expect("stop poller");
}
