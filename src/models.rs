use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    // Filled in by aggregation, never by the remote service
    #[serde(default, skip_deserializing)]
    pub comment_count: Option<usize>,
}

impl Post {
    pub fn with_comment_count(mut self, count: usize) -> Self {
        self.comment_count = Some(count);
        self
    }

    pub fn comments(&self) -> usize {
        self.comment_count.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub post_id: String,
    #[serde(default)]
    pub content: String,
}

/// Wire shape of `GET /users`: a map of user id to display name.
/// Entries keep the order they appear in the payload.
#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    #[serde(deserialize_with = "ordered_entries")]
    pub users: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
pub struct PostsResponse {
    pub posts: Vec<Post>,
}

#[derive(Debug, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
}

/// A user together with the total number of comments across all of their posts.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedUser {
    pub user: User,
    pub comment_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendingPosts {
    pub posts: Vec<Post>,
    pub users: HashMap<String, User>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub posts: Vec<Post>,
    pub users: HashMap<String, User>,
}

pub fn user_lookup(users: &[User]) -> HashMap<String, User> {
    users
        .iter()
        .map(|user| (user.id.clone(), user.clone()))
        .collect()
}

// The service has been seen returning numeric ids, normalise them to strings
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

fn ordered_entries<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of user id to name")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, name)) = map.next_entry::<String, String>()? {
                entries.push((id, name));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}
