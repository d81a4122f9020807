use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::cache::{FeedStreamCache, SharedFeedStream};
use crate::error::StreamError;
use crate::fetcher::Fetcher;
use crate::keys::{ConversationKeyMaker, KeyMaker, ReaderKeyMaker};
use crate::post_state::{NoPostStates, PostStateLookup};
use crate::stream::{FeedStream, StreamVariant, DEFAULT_PAGE_SIZE};

/// The streams the reader knows how to fetch, parsed from a stream id such
/// as `following`, `feed:42` or `list:owner/slug`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Following,
    Conversations,
    ConversationsA8c,
    A8c,
    Likes,
    Feed(u64),
    Site(u64),
    Tag(String),
    Search(String),
    List { owner: String, slug: String },
}

impl StreamKind {
    pub fn parse(id: &str) -> Result<Self, StreamError> {
        let unknown = || StreamError::UnknownStream(id.to_owned());
        let kind = match id.split_once(':') {
            None => match id {
                "following" => StreamKind::Following,
                "conversations" => StreamKind::Conversations,
                "conversations-a8c" => StreamKind::ConversationsA8c,
                "a8c" => StreamKind::A8c,
                "likes" => StreamKind::Likes,
                _ => return Err(unknown()),
            },
            Some(("feed", value)) => StreamKind::Feed(value.parse().map_err(|_| unknown())?),
            Some(("site", value)) => StreamKind::Site(value.parse().map_err(|_| unknown())?),
            Some(("tag", slug)) if is_path_segment(slug) => StreamKind::Tag(slug.to_owned()),
            Some(("search", query)) if !query.is_empty() => StreamKind::Search(query.to_owned()),
            Some(("list", path)) => match path.split_once('/') {
                Some((owner, slug)) if is_path_segment(owner) && is_path_segment(slug) => {
                    StreamKind::List {
                        owner: owner.to_owned(),
                        slug: slug.to_owned(),
                    }
                }
                _ => return Err(unknown()),
            },
            Some(_) => return Err(unknown()),
        };
        Ok(kind)
    }

    /// REST path below the API base url, one entry per segment. Entries are
    /// unescaped; the caller percent-encodes each one.
    pub fn path_segments(&self) -> Vec<String> {
        let (collection, item): (&str, Option<String>) = match self {
            StreamKind::Following => ("following", None),
            StreamKind::Conversations | StreamKind::ConversationsA8c => ("conversations", None),
            StreamKind::A8c => ("a8c", None),
            StreamKind::Likes => ("liked", None),
            StreamKind::Search(_) => ("search", None),
            StreamKind::Feed(id) => ("feed", Some(id.to_string())),
            StreamKind::Site(id) => ("sites", Some(id.to_string())),
            StreamKind::Tag(slug) => ("tags", Some(slug.clone())),
            StreamKind::List { owner, slug } => {
                return vec![
                    "read".into(),
                    "list".into(),
                    owner.clone(),
                    slug.clone(),
                    "posts".into(),
                ];
            }
        };
        let mut segments = vec!["read".to_owned(), collection.to_owned()];
        if let Some(item) = item {
            segments.push(item);
            segments.push("posts".to_owned());
        }
        segments
    }

    /// Fixed query parameters the endpoint needs.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            StreamKind::ConversationsA8c => vec![("index", "a8c".into())],
            StreamKind::Search(query) => vec![("q", query.clone())],
            _ => Vec::new(),
        }
    }

    pub fn variant(&self) -> StreamVariant {
        match self {
            StreamKind::Conversations | StreamKind::ConversationsA8c => {
                StreamVariant::Conversations
            }
            _ => StreamVariant::Standard,
        }
    }

    pub fn key_maker(&self) -> Arc<dyn KeyMaker> {
        match self.variant() {
            StreamVariant::Conversations => Arc::new(ConversationKeyMaker),
            StreamVariant::Standard => Arc::new(ReaderKeyMaker),
        }
    }
}

// dot segments would be dropped from the request path
fn is_path_segment(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".."
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Following => f.write_str("following"),
            StreamKind::Conversations => f.write_str("conversations"),
            StreamKind::ConversationsA8c => f.write_str("conversations-a8c"),
            StreamKind::A8c => f.write_str("a8c"),
            StreamKind::Likes => f.write_str("likes"),
            StreamKind::Feed(id) => write!(f, "feed:{id}"),
            StreamKind::Site(id) => write!(f, "site:{id}"),
            StreamKind::Tag(slug) => write!(f, "tag:{slug}"),
            StreamKind::Search(query) => write!(f, "search:{query}"),
            StreamKind::List { owner, slug } => write!(f, "list:{owner}/{slug}"),
        }
    }
}

/// Hands out one stream per id, building it on first use.
#[derive(Clone)]
pub struct StreamFactory {
    cache: FeedStreamCache,
    fetcher: Arc<dyn Fetcher>,
    post_states: Arc<dyn PostStateLookup>,
    page_size: usize,
}

impl StreamFactory {
    pub fn new(cache: FeedStreamCache, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            cache,
            fetcher,
            post_states: Arc::new(NoPostStates),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_post_states(mut self, post_states: Arc<dyn PostStateLookup>) -> Self {
        self.post_states = post_states;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn cache(&self) -> &FeedStreamCache {
        &self.cache
    }

    pub async fn stream(&self, id: &str) -> Result<SharedFeedStream, StreamError> {
        let kind = StreamKind::parse(id)?;
        self.cache
            .get_or_try_insert_with(id, || -> Result<FeedStream, StreamError> {
                info!(stream = %id, "creating stream");
                let stream = FeedStream::builder()
                    .id(id)
                    .fetcher(self.fetcher.clone())
                    .key_maker(kind.key_maker())
                    .post_states(self.post_states.clone())
                    .variant(kind.variant())
                    .page_size(self.page_size)
                    .build()?;
                Ok(stream)
            })
            .await
    }
}
