use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::PostIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostState {
    Pending,
    Ready,
    Error,
}

/// Answers whether a post failed to load. Streams skip errored posts when
/// moving the selection.
pub trait PostStateLookup: Send + Sync {
    fn is_error(&self, identity: &PostIdentity) -> bool;
}

/// Lookup for callers that do not track post state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPostStates;

impl PostStateLookup for NoPostStates {
    fn is_error(&self, _identity: &PostIdentity) -> bool {
        false
    }
}

/// Shared in-memory post state table.
#[derive(Debug, Clone, Default)]
pub struct PostStates {
    inner: Arc<RwLock<HashMap<PostIdentity, PostState>>>,
}

impl PostStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identity: PostIdentity, state: PostState) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(identity, state);
    }

    pub fn remove(&self, identity: &PostIdentity) -> Option<PostState> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(identity)
    }

    pub fn state(&self, identity: &PostIdentity) -> Option<PostState> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(identity).copied()
    }
}

impl PostStateLookup for PostStates {
    fn is_error(&self, identity: &PostIdentity) -> bool {
        self.state(identity) == Some(PostState::Error)
    }
}
