use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Reads an API timestamp: RFC 3339, or an offset-less timestamp taken as UTC.
pub fn parse_api_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

// a bad timestamp on one post must not reject the whole response
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_api_date))
}

/// Where a post lives: a WordPress blog or an external feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PostSource {
    #[serde(rename = "blogId")]
    Blog(u64),
    #[serde(rename = "feedId")]
    Feed(u64),
}

/// The part of a [`PostKey`] that decides whether two keys are the same post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PostIdentity {
    pub source: PostSource,
    pub post_id: u64,
}

impl PostIdentity {
    pub fn blog(blog_id: u64, post_id: u64) -> Self {
        Self {
            source: PostSource::Blog(blog_id),
            post_id,
        }
    }

    pub fn feed(feed_id: u64, feed_item_id: u64) -> Self {
        Self {
            source: PostSource::Feed(feed_id),
            post_id: feed_item_id,
        }
    }
}

impl fmt::Display for PostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            PostSource::Blog(id) => write!(f, "blog {}/{}", id, self.post_id),
            PostSource::Feed(id) => write!(f, "feed {}/{}", id, self.post_id),
        }
    }
}

/// Normalised reference to one post inside a stream.
///
/// Identity is `(source, post_id)`; the remaining fields drive ordering and
/// change detection for conversation streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostKey {
    #[serde(flatten)]
    pub source: PostSource,
    #[serde(rename = "postId")]
    pub post_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_comment_date_gmt: Option<DateTime<Utc>>,
    /// Comment ids, newest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<u64>,
}

impl PostKey {
    pub fn new(identity: PostIdentity) -> Self {
        Self {
            source: identity.source,
            post_id: identity.post_id,
            date: None,
            last_comment_date_gmt: None,
            comments: Vec::new(),
        }
    }

    pub fn blog(blog_id: u64, post_id: u64) -> Self {
        Self::new(PostIdentity::blog(blog_id, post_id))
    }

    pub fn feed(feed_id: u64, feed_item_id: u64) -> Self {
        Self::new(PostIdentity::feed(feed_id, feed_item_id))
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn identity(&self) -> PostIdentity {
        PostIdentity {
            source: self.source,
            post_id: self.post_id,
        }
    }

    /// Date the stream orders by: last comment activity when known, else the post date.
    pub fn sort_date(&self) -> Option<DateTime<Utc>> {
        self.last_comment_date_gmt.or(self.date)
    }

    /// True when `other` carries comment activity this key has not seen.
    pub fn has_new_activity(&self, other: &PostKey) -> bool {
        self.comments != other.comments || self.last_comment_date_gmt != other.last_comment_date_gmt
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawComment {
    #[serde(rename = "ID")]
    pub id: u64,
}

/// Post object as returned by the reader REST endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawPost {
    #[serde(rename = "ID", default)]
    pub id: Option<u64>,
    #[serde(rename = "site_ID", default)]
    pub site_id: Option<u64>,
    #[serde(rename = "feed_ID", default)]
    pub feed_id: Option<u64>,
    #[serde(rename = "feed_item_ID", default)]
    pub feed_item_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_comment_date_gmt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Vec<RawComment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Response body of a page request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Page {
    #[serde(default)]
    pub posts: Vec<RawPost>,
    #[serde(default)]
    pub meta: PageMeta,
}

impl Page {
    pub fn new(posts: Vec<RawPost>) -> Self {
        Self {
            posts,
            meta: PageMeta::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

/// Response body of an updates request: every post newer than `date_range.after`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdatePayload {
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_key_uses_wire_field_names() {
        let key = PostKey {
            comments: vec![3, 2, 1],
            ..PostKey::blog(1, 7)
        };
        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "blogId": 1, "postId": 7, "comments": [3, 2, 1] })
        );

        let back: PostKey = serde_json::from_value(value).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn raw_post_reads_api_payload() {
        let post: RawPost = serde_json::from_str(
            r#"{
                "site_ID": 1,
                "ID": 2,
                "date": "2016-09-15T00:00:00+00:00",
                "comments": [{ "ID": 5 }],
                "title": "ignored"
            }"#,
        )
        .unwrap();
        assert_eq!(post.site_id, Some(1));
        assert_eq!(post.id, Some(2));
        assert_eq!(post.comments, vec![RawComment { id: 5 }]);
        assert!(post.date.is_some());
        assert!(post.feed_id.is_none());
    }

    #[test]
    fn page_survives_naive_and_broken_dates() {
        let page: Page = serde_json::from_str(
            r#"{"posts":[
                {"site_ID":1,"ID":1},
                {"site_ID":1,"ID":2,"date":"2016-09-15T00:00:00"},
                {"site_ID":1,"ID":3,"date":"not a date","last_comment_date_gmt":false},
                {"site_ID":1,"ID":4,"date":null}
            ]}"#,
        )
        .unwrap();
        assert_eq!(page.posts.len(), 4);
        assert_eq!(page.posts[0].date, None);
        assert_eq!(
            page.posts[1].date,
            Some("2016-09-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
        assert_eq!(page.posts[2].date, None);
        assert_eq!(page.posts[2].last_comment_date_gmt, None);
        assert_eq!(page.posts[3].date, None);
    }

    #[test]
    fn api_dates_accept_offsets_and_fractions() {
        let expected = "2020-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse_api_date("2020-01-01T01:00:00+01:00"), Some(expected));
        assert_eq!(parse_api_date("2020-01-01T00:00:00.000"), Some(expected));
        assert_eq!(parse_api_date("yesterday"), None);
    }

    #[test]
    fn identity_ignores_dates_and_comments() {
        let a = PostKey {
            comments: vec![1],
            ..PostKey::feed(1, 2)
        };
        let b = PostKey::feed(1, 2);
        assert_ne!(a, b);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(PostKey::blog(1, 2).identity(), b.identity());
    }
}
