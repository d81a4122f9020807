use crate::model::{PostKey, RawPost};

/// Derives the [`PostKey`] a stream stores for a raw post.
///
/// Returning `None` drops the post from the stream.
pub trait KeyMaker: Send + Sync {
    fn make_key(&self, post: &RawPost) -> Option<PostKey>;
}

impl<F> KeyMaker for F
where
    F: Fn(&RawPost) -> Option<PostKey> + Send + Sync,
{
    fn make_key(&self, post: &RawPost) -> Option<PostKey> {
        self(post)
    }
}

/// Identity-based key maker used by ordinary reader streams.
///
/// Feed items (`feed_ID` + `feed_item_ID`) win over blog posts
/// (`site_ID` + `ID`); a bare `feed_ID` + `ID` pair is read as a feed item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderKeyMaker;

impl KeyMaker for ReaderKeyMaker {
    fn make_key(&self, post: &RawPost) -> Option<PostKey> {
        let key = match (post.feed_id, post.feed_item_id, post.site_id, post.id) {
            (Some(feed_id), Some(item_id), _, _) => PostKey::feed(feed_id, item_id),
            (_, _, Some(site_id), Some(post_id)) => PostKey::blog(site_id, post_id),
            (Some(feed_id), None, None, Some(post_id)) => PostKey::feed(feed_id, post_id),
            _ => return None,
        };
        Some(PostKey {
            date: post.date,
            ..key
        })
    }
}

/// Key maker for conversation streams: blog identity plus the comment ids,
/// newest first, so new comment activity can be detected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationKeyMaker;

impl KeyMaker for ConversationKeyMaker {
    fn make_key(&self, post: &RawPost) -> Option<PostKey> {
        let (site_id, post_id) = (post.site_id?, post.id?);
        Some(PostKey {
            date: post.date,
            last_comment_date_gmt: post.last_comment_date_gmt,
            comments: post.comments.iter().rev().map(|comment| comment.id).collect(),
            ..PostKey::blog(site_id, post_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PostIdentity, RawComment};

    #[test]
    fn reader_keys_prefer_feed_items() {
        let post = RawPost {
            id: Some(10),
            site_id: Some(3),
            feed_id: Some(1),
            feed_item_id: Some(20),
            ..Default::default()
        };
        let key = ReaderKeyMaker.make_key(&post).unwrap();
        assert_eq!(key.identity(), PostIdentity::feed(1, 20));
    }

    #[test]
    fn reader_keys_fall_back_to_blog_then_feed() {
        let blog = RawPost {
            id: Some(10),
            site_id: Some(3),
            ..Default::default()
        };
        assert_eq!(
            ReaderKeyMaker.make_key(&blog).unwrap().identity(),
            PostIdentity::blog(3, 10)
        );

        let feed = RawPost {
            id: Some(2),
            feed_id: Some(1),
            ..Default::default()
        };
        assert_eq!(
            ReaderKeyMaker.make_key(&feed).unwrap().identity(),
            PostIdentity::feed(1, 2)
        );

        assert!(ReaderKeyMaker.make_key(&RawPost::default()).is_none());
    }

    #[test]
    fn conversation_keys_reverse_comments() {
        let post = RawPost {
            id: Some(1),
            site_id: Some(1),
            comments: vec![RawComment { id: 1 }, RawComment { id: 2 }, RawComment { id: 3 }],
            ..Default::default()
        };
        let key = ConversationKeyMaker.make_key(&post).unwrap();
        assert_eq!(key.comments, vec![3, 2, 1]);
    }

    #[test]
    fn closures_are_key_makers() {
        let only_blog_one = |post: &RawPost| match post.site_id {
            Some(1) => post.id.map(|id| PostKey::blog(1, id)),
            _ => None,
        };
        let post = RawPost {
            id: Some(4),
            site_id: Some(1),
            ..Default::default()
        };
        assert_eq!(only_blog_one.make_key(&post), Some(PostKey::blog(1, 4)));
    }
}
