use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::stream::FeedStream;

pub type SharedFeedStream = Arc<RwLock<FeedStream>>;

/// Named stream instances shared between the callers that display them.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct FeedStreamCache {
    inner: Arc<RwLock<HashMap<String, SharedFeedStream>>>,
}

impl FeedStreamCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<SharedFeedStream> {
        self.inner.read().await.get(id).cloned()
    }

    /// Stores `stream` under its id, replacing any previous instance.
    pub async fn insert(&self, stream: FeedStream) -> SharedFeedStream {
        let id = stream.id().to_owned();
        let shared = Arc::new(RwLock::new(stream));
        let mut inner = self.inner.write().await;
        if inner.insert(id.clone(), shared.clone()).is_some() {
            debug!(stream = %id, "replaced cached stream");
        }
        shared
    }

    /// Returns the cached stream for `id`, building it with `build` if absent.
    pub async fn get_or_try_insert_with<F, E>(
        &self,
        id: &str,
        build: F,
    ) -> Result<SharedFeedStream, E>
    where
        F: FnOnce() -> Result<FeedStream, E>,
    {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.get(id) {
            return Ok(existing.clone());
        }
        let shared = Arc::new(RwLock::new(build()?));
        inner.insert(id.to_owned(), shared.clone());
        debug!(stream = %id, "cached new stream");
        Ok(shared)
    }

    pub async fn remove(&self, id: &str) -> Option<SharedFeedStream> {
        self.inner.write().await.remove(id)
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn streams(&self) -> Vec<SharedFeedStream> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drops every cached stream.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchRequest;
    use crate::model::{Page, RawPost};

    fn stream(id: &str) -> FeedStream {
        FeedStream::with_fetcher(id, Arc::new(|_request: FetchRequest| {}))
    }

    #[tokio::test]
    async fn insert_get_and_clear() {
        let cache = FeedStreamCache::new();
        cache.insert(stream("following")).await;
        cache.insert(stream("likes")).await;

        assert_eq!(cache.ids().await, vec!["following", "likes"]);
        assert!(cache.get("following").await.is_some());
        assert!(cache.get("tag:rust").await.is_none());

        cache.clear().await;
        assert!(cache.is_empty().await);
        assert!(cache.get("following").await.is_none());
    }

    #[tokio::test]
    async fn get_or_try_insert_reuses_instance() {
        let cache = FeedStreamCache::new();
        let first = cache
            .get_or_try_insert_with("following", || Ok::<_, ()>(stream("following")))
            .await
            .unwrap();
        first.write().await.receive_page(
            "following",
            Ok(Page::new(vec![RawPost {
                feed_id: Some(1),
                id: Some(1),
                ..Default::default()
            }])),
        );

        let second = cache
            .get_or_try_insert_with("following", || Err(()))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.read().await.get().len(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = FeedStreamCache::new();
        let other = cache.clone();
        cache.insert(stream("likes")).await;
        assert_eq!(other.len().await, 1);
        assert!(other.remove("likes").await.is_some());
        assert!(cache.is_empty().await);
    }
}
