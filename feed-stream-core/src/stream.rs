use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{FetchError, SpecError, StreamError};
use crate::fetcher::{FetchRequest, Fetcher, RequestOptions};
use crate::keys::{KeyMaker, ReaderKeyMaker};
use crate::model::{
    parse_api_date, DateRange, Page, PostIdentity, PostKey, RawPost, UpdatePayload,
};
use crate::post_state::{NoPostStates, PostStateLookup};

pub const DEFAULT_PAGE_SIZE: usize = 7;

/// How a stream treats incoming update sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamVariant {
    #[default]
    Standard,
    /// Updates only count posts with comment activity the stream has not seen.
    Conversations,
}

/// The required pieces of a stream, checked at compile time.
pub struct FeedStreamSpec {
    pub id: String,
    pub fetcher: Arc<dyn Fetcher>,
    pub key_maker: Arc<dyn KeyMaker>,
}

/// Assembles a [`FeedStream`] from parts that may be missing at runtime.
#[derive(Default)]
pub struct FeedStreamBuilder {
    id: Option<String>,
    fetcher: Option<Arc<dyn Fetcher>>,
    key_maker: Option<Arc<dyn KeyMaker>>,
    post_states: Option<Arc<dyn PostStateLookup>>,
    variant: StreamVariant,
    page_size: Option<usize>,
}

impl FeedStreamBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn key_maker(mut self, key_maker: Arc<dyn KeyMaker>) -> Self {
        self.key_maker = Some(key_maker);
        self
    }

    pub fn post_states(mut self, post_states: Arc<dyn PostStateLookup>) -> Self {
        self.post_states = Some(post_states);
        self
    }

    pub fn variant(mut self, variant: StreamVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn build(self) -> Result<FeedStream, SpecError> {
        if self.id.is_none() && self.fetcher.is_none() && self.key_maker.is_none() {
            return Err(SpecError::MissingSpec);
        }
        let fetcher = self.fetcher.ok_or(SpecError::MissingFetcher)?;
        let key_maker = self.key_maker.ok_or(SpecError::MissingKeyMaker)?;
        let id = self.id.ok_or(SpecError::MissingId)?;

        let mut stream = FeedStream::new(FeedStreamSpec {
            id,
            fetcher,
            key_maker,
        });
        if let Some(post_states) = self.post_states {
            stream.post_states = post_states;
        }
        stream.variant = self.variant;
        stream.page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        Ok(stream)
    }
}

/// Ordered, deduplicated window of post keys for one stream, newest first,
/// with a pending update set and a selection cursor.
pub struct FeedStream {
    id: String,
    fetcher: Arc<dyn Fetcher>,
    key_maker: Arc<dyn KeyMaker>,
    post_states: Arc<dyn PostStateLookup>,
    variant: StreamVariant,
    page_size: usize,
    post_keys: Vec<PostKey>,
    pending_updates: Vec<PostKey>,
    update_count: usize,
    date_range: Option<DateRange>,
    selected: Option<usize>,
    next_page: Option<String>,
    is_fetching: bool,
    is_last_page: bool,
    last_error: Option<String>,
}

impl fmt::Debug for FeedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedStream")
            .field("id", &self.id)
            .field("variant", &self.variant)
            .field("post_keys", &self.post_keys.len())
            .field("update_count", &self.update_count)
            .field("selected", &self.selected)
            .field("is_fetching", &self.is_fetching)
            .field("is_last_page", &self.is_last_page)
            .finish_non_exhaustive()
    }
}

impl FeedStream {
    pub fn builder() -> FeedStreamBuilder {
        FeedStreamBuilder::default()
    }

    pub fn new(spec: FeedStreamSpec) -> Self {
        Self {
            id: spec.id,
            fetcher: spec.fetcher,
            key_maker: spec.key_maker,
            post_states: Arc::new(NoPostStates),
            variant: StreamVariant::Standard,
            page_size: DEFAULT_PAGE_SIZE,
            post_keys: Vec::new(),
            pending_updates: Vec::new(),
            update_count: 0,
            date_range: None,
            selected: None,
            next_page: None,
            is_fetching: false,
            is_last_page: false,
            last_error: None,
        }
    }

    /// Older two-part form: keys come from [`ReaderKeyMaker`].
    pub fn with_fetcher(id: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(FeedStreamSpec {
            id: id.into(),
            fetcher,
            key_maker: Arc::new(ReaderKeyMaker),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant(&self) -> StreamVariant {
        self.variant
    }

    /// Current window, newest first.
    pub fn get(&self) -> &[PostKey] {
        &self.post_keys
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub fn pending_updates(&self) -> &[PostKey] {
        &self.pending_updates
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    pub fn is_last_page(&self) -> bool {
        self.is_last_page
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replaces the window with `page`. Responses for another id are ignored.
    pub fn receive_page(&mut self, id: &str, result: Result<Page, FetchError>) {
        if id != self.id {
            debug!(stream = %self.id, response = %id, "ignoring page for another stream");
            return;
        }
        self.is_fetching = false;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                warn!(stream = %self.id, error = %err, "page request failed");
                self.last_error = Some(err.to_string());
                return;
            }
        };

        let selected = self.selected_identity();
        self.post_keys = self.normalize(&page.posts);
        self.is_last_page = page.posts.is_empty();
        self.next_page = page.meta.next_page;
        self.last_error = None;
        self.reselect(selected);
        debug!(stream = %self.id, posts = self.post_keys.len(), "received page");
    }

    /// Replaces the pending update set with `payload`.
    ///
    /// Each payload is the complete set of posts newer than
    /// `date_range.after`, so the count is never accumulated across calls.
    pub fn receive_updates(&mut self, id: &str, result: Result<UpdatePayload, FetchError>) {
        if id != self.id {
            debug!(stream = %self.id, response = %id, "ignoring updates for another stream");
            return;
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                warn!(stream = %self.id, error = %err, "updates request failed");
                self.last_error = Some(err.to_string());
                return;
            }
        };

        let mut updates = self.normalize(&payload.posts);
        if self.variant == StreamVariant::Conversations {
            updates.retain(|candidate| self.is_new_information(candidate));
        }
        self.update_count = updates.len();
        self.pending_updates = updates;
        self.date_range = Some(payload.date_range);
        self.last_error = None;
        debug!(stream = %self.id, updates = self.update_count, "received updates");
    }

    /// Keys for the posts that are unknown to this stream or carry new
    /// comment activity compared with the stored key.
    pub fn filter_new_posts(&self, posts: &[RawPost]) -> Vec<PostKey> {
        posts
            .iter()
            .filter_map(|post| self.key_maker.make_key(post))
            .filter(|candidate| self.is_new_information(candidate))
            .collect()
    }

    /// Merges the pending update set into the window and returns how many
    /// keys were merged.
    pub fn show_updates(&mut self) -> usize {
        let incoming = std::mem::take(&mut self.pending_updates);
        self.update_count = 0;
        if incoming.is_empty() {
            return 0;
        }

        let merged = incoming.len();
        let selected = self.selected_identity();
        let replaced: HashSet<PostIdentity> = incoming.iter().map(PostKey::identity).collect();
        let mut keys = incoming;
        keys.extend(
            std::mem::take(&mut self.post_keys)
                .into_iter()
                .filter(|key| !replaced.contains(&key.identity())),
        );
        sort_newest_first(&mut keys);
        self.post_keys = keys;
        self.reselect(selected);
        debug!(stream = %self.id, merged, "merged updates into window");
        merged
    }

    /// Asks the fetcher for the next page. Returns false when a page is
    /// already in flight or the last page has been seen.
    pub fn fetch_next_page(&mut self) -> bool {
        if self.is_fetching || self.is_last_page {
            debug!(stream = %self.id, "skipping page request");
            return false;
        }
        let options = RequestOptions {
            before: self.post_keys.last().and_then(PostKey::sort_date),
            ..RequestOptions::new(self.page_size)
        };
        let request = FetchRequest::Page {
            stream_id: self.id.clone(),
            page_handle: self.next_page.clone(),
            options,
        };
        match self.fetcher.fetch(request) {
            Ok(()) => {
                self.is_fetching = true;
                true
            }
            Err(err) => {
                warn!(stream = %self.id, error = %err, "could not start page request");
                self.last_error = Some(err.to_string());
                false
            }
        }
    }

    /// Asks the fetcher for everything newer than the newest post in the
    /// window, or newer than the last update boundary while the window has
    /// no dated post.
    pub fn request_updates(&self) {
        let after = self
            .post_keys
            .iter()
            .find_map(PostKey::sort_date)
            .or_else(|| {
                self.date_range
                    .as_ref()
                    .and_then(|range| range.after.as_deref())
                    .and_then(parse_api_date)
            });
        let options = RequestOptions {
            after,
            ..RequestOptions::new(self.page_size)
        };
        let request = FetchRequest::Updates {
            stream_id: self.id.clone(),
            options,
        };
        if let Err(err) = self.fetcher.fetch(request) {
            warn!(stream = %self.id, error = %err, "could not start updates request");
        }
    }

    /// Selects the post with `identity`. An unknown post is an error and the
    /// current selection is kept.
    pub fn select_item(&mut self, identity: PostIdentity) -> Result<(), StreamError> {
        match self.position_of(&identity) {
            Some(index) => {
                self.selected = Some(index);
                Ok(())
            }
            None => Err(StreamError::PostNotInStream {
                stream: self.id.clone(),
                identity,
            }),
        }
    }

    pub fn selected_post_key(&self) -> Option<&PostKey> {
        self.selected.and_then(|index| self.post_keys.get(index))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Moves the selection one valid post toward older posts. With nothing
    /// selected the first valid post is chosen. Returns whether it moved.
    pub fn select_next_item(&mut self) -> bool {
        let start = self.selected.map_or(0, |index| index + 1);
        let next = (start..self.post_keys.len()).find(|&index| !self.is_errored(index));
        self.move_selection(next)
    }

    /// Moves the selection one valid post toward newer posts.
    pub fn select_prev_item(&mut self) -> bool {
        let Some(current) = self.selected else {
            return false;
        };
        let prev = (0..current).rev().find(|&index| !self.is_errored(index));
        self.move_selection(prev)
    }

    fn move_selection(&mut self, target: Option<usize>) -> bool {
        match target {
            Some(index) => {
                self.selected = Some(index);
                true
            }
            None => false,
        }
    }

    fn is_errored(&self, index: usize) -> bool {
        self.post_states.is_error(&self.post_keys[index].identity())
    }

    fn position_of(&self, identity: &PostIdentity) -> Option<usize> {
        self.post_keys
            .iter()
            .position(|key| key.identity() == *identity)
    }

    fn selected_identity(&self) -> Option<PostIdentity> {
        self.selected_post_key().map(PostKey::identity)
    }

    fn reselect(&mut self, identity: Option<PostIdentity>) {
        self.selected = identity.and_then(|identity| self.position_of(&identity));
    }

    fn is_new_information(&self, candidate: &PostKey) -> bool {
        match self.position_of(&candidate.identity()) {
            Some(index) => self.post_keys[index].has_new_activity(candidate),
            None => true,
        }
    }

    fn normalize(&self, posts: &[RawPost]) -> Vec<PostKey> {
        let mut seen = HashSet::new();
        let mut keys: Vec<PostKey> = posts
            .iter()
            .filter_map(|post| self.key_maker.make_key(post))
            .filter(|key| seen.insert(key.identity()))
            .collect();
        if keys.len() < posts.len() {
            debug!(
                stream = %self.id,
                dropped = posts.len() - keys.len(),
                "dropped posts without a key or with a duplicate identity"
            );
        }
        sort_newest_first(&mut keys);
        keys
    }
}

/// Stable sort, newest first; undated keys go last in arrival order.
fn sort_newest_first(keys: &mut [PostKey]) {
    keys.sort_by(|a, b| b.sort_date().cmp(&a.sort_date()));
}
