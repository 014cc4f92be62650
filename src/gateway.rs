use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{Clock, FreshnessCache, SystemClock};
use crate::config::{DashboardConfig, DEFAULT_MAX_CONCURRENT_REQUESTS};
use crate::fallback;
use crate::models::{Comment, CommentsResponse, Post, PostsResponse, User, UsersResponse};

const USERS_KEY: &str = "users";

/// Read access to the social data service.
///
/// Implementations decide for themselves how to absorb failures of the three
/// resource calls; anything they return as `Err` reaches the caller.
#[async_trait]
pub trait SocialGateway: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn list_posts_by_user(&self, user_id: &str) -> Result<Vec<Post>>;

    async fn list_comments_by_post(&self, post_id: &str) -> Result<Vec<Comment>>;

    /// How many requests a fan-out may have in flight at once.
    fn max_concurrent_requests(&self) -> usize {
        DEFAULT_MAX_CONCURRENT_REQUESTS
    }

    /// Forget any memoized responses. Gateways without a cache ignore this.
    fn clear_cache(&self) {}

    /// Every post of every user, each carrying its comment count.
    ///
    /// Unlike the single-resource calls this never substitutes bundled data:
    /// any failure along the way yields an empty list.
    async fn list_all_posts_with_comment_counts(&self) -> Vec<Post> {
        let result: Result<Vec<Post>> = async {
            let users = self.list_users().await?;
            let posts = posts_for_users(self, &users).await?;
            with_comment_counts(self, posts.into_iter().flatten().collect()).await
        }
        .await;

        match result {
            Ok(posts) => posts,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to collect posts with comment counts");
                Vec::new()
            }
        }
    }
}

/// Fetches each user's posts concurrently, keeping the order of `users`.
pub async fn posts_for_users<G>(gateway: &G, users: &[User]) -> Result<Vec<Vec<Post>>>
where
    G: SocialGateway + ?Sized,
{
    let ids: Vec<String> = users.iter().map(|user| user.id.clone()).collect();
    stream::iter(ids)
        .map(|id| async move { gateway.list_posts_by_user(&id).await })
        .buffered(gateway.max_concurrent_requests().max(1))
        .try_collect()
        .await
}

/// Counts the comments of each post concurrently, keeping the order of `posts`.
pub async fn with_comment_counts<G>(gateway: &G, posts: Vec<Post>) -> Result<Vec<Post>>
where
    G: SocialGateway + ?Sized,
{
    stream::iter(posts)
        .map(|post| async move {
            let comments = gateway.list_comments_by_post(&post.id).await?;
            Ok::<_, anyhow::Error>(post.with_comment_count(comments.len()))
        })
        .buffered(gateway.max_concurrent_requests().max(1))
        .try_collect()
        .await
}

fn random_user_image() -> String {
    let mut rng = rand::thread_rng();
    let index = rng.gen_range(1..=10);
    let folder = if rng.gen_bool(0.5) { "men" } else { "women" };
    format!("https://randomuser.me/api/portraits/{}/{}.jpg", folder, index)
}

fn random_post_image() -> String {
    let seed = rand::thread_rng().gen_range(0..1000);
    format!("https://picsum.photos/seed/{}/600/400", seed)
}

/// Gateway backed by the HTTP service, with bundled data as a safety net.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    cache_ttl: Duration,
    max_concurrent_requests: usize,
    users_cache: FreshnessCache<Vec<User>>,
    comments_cache: FreshnessCache<Vec<Comment>>,
}

impl HttpGateway {
    pub fn new(config: &DashboardConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &DashboardConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("social_insight/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            cache_ttl: config.cache_ttl,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            users_cache: FreshnessCache::new(clock.clone()),
            comments_cache: FreshnessCache::new(clock),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "requesting");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("{} answered with an error status", url))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("unexpected payload from {}", url))
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        let response: UsersResponse = self.get_json("/users").await?;
        Ok(response
            .users
            .into_iter()
            .map(|(id, name)| User {
                id,
                name,
                image_url: Some(random_user_image()),
            })
            .collect())
    }

    async fn fetch_posts(&self, user_id: &str) -> Result<Vec<Post>> {
        let path = format!("/users/{}/posts", urlencoding::encode(user_id));
        let response: PostsResponse = self.get_json(&path).await?;
        Ok(response
            .posts
            .into_iter()
            .map(|mut post| {
                if post.image_url.is_none() {
                    post.image_url = Some(random_post_image());
                }
                post
            })
            .collect())
    }

    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let path = format!("/posts/{}/comments", urlencoding::encode(post_id));
        let response: CommentsResponse = self.get_json(&path).await?;
        Ok(response.comments)
    }
}

#[async_trait]
impl SocialGateway for HttpGateway {
    async fn list_users(&self) -> Result<Vec<User>> {
        match self
            .users_cache
            .get_or_fetch(USERS_KEY, self.cache_ttl, || self.fetch_users())
            .await
        {
            Ok(users) => Ok(users),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to fetch users, using bundled data");
                Ok(fallback::users())
            }
        }
    }

    async fn list_posts_by_user(&self, user_id: &str) -> Result<Vec<Post>> {
        match self.fetch_posts(user_id).await {
            Ok(posts) => Ok(posts),
            Err(e) => {
                warn!(user_id, error = %format!("{e:#}"), "failed to fetch posts, using bundled data");
                Ok(fallback::posts_by_user(user_id))
            }
        }
    }

    async fn list_comments_by_post(&self, post_id: &str) -> Result<Vec<Comment>> {
        let key = format!("comments:{}", post_id);
        match self
            .comments_cache
            .get_or_fetch(&key, self.cache_ttl, || self.fetch_comments(post_id))
            .await
        {
            Ok(comments) => Ok(comments),
            Err(e) => {
                warn!(post_id, error = %format!("{e:#}"), "failed to fetch comments, using bundled data");
                Ok(fallback::comments_by_post(post_id))
            }
        }
    }

    fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    fn clear_cache(&self) {
        debug!(
            users = self.users_cache.len(),
            comments = self.comments_cache.len(),
            "clearing response cache"
        );
        self.users_cache.clear();
        self.comments_cache.clear();
    }
}
