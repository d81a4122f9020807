pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod fetcher;
pub mod keys;
pub mod model;
pub mod poller;
pub mod post_state;
pub mod stream;

pub use cache::{FeedStreamCache, SharedFeedStream};
pub use config::{ApiConfig, FeedStreamConfig, StreamsConfig};
pub use dispatch::{dispatch, spawn_dispatcher};
pub use error::{ConfigError, FetchError, PollError, SpecError, StreamError};
pub use factory::{StreamFactory, StreamKind};
pub use fetcher::{ChannelFetcher, FetchRequest, FetchResponse, Fetcher, HttpFetcher, RequestOptions};
pub use keys::{ConversationKeyMaker, KeyMaker, ReaderKeyMaker};
pub use model::{
    DateRange, Page, PageMeta, PostIdentity, PostKey, PostSource, RawComment, RawPost,
    UpdatePayload,
};
pub use poller::{poll_once, spawn_update_poller, PollConfig, PollerHandle};
pub use post_state::{NoPostStates, PostState, PostStateLookup, PostStates};
pub use stream::{FeedStream, FeedStreamBuilder, FeedStreamSpec, StreamVariant};
