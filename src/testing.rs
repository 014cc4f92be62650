use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::gateway::SocialGateway;
use crate::models::{Comment, Post, User};

/// In-memory gateway with switchable failures and optional latency.
#[derive(Default)]
pub struct FakeGateway {
    users: Vec<User>,
    posts: Vec<Post>,
    comments: HashMap<String, Vec<Comment>>,
    failing_users: bool,
    failing_posts: HashSet<String>,
    failing_comments: HashSet<String>,
    concurrency: Option<usize>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pub user_calls: AtomicUsize,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, name: &str) -> Self {
        self.users.push(User {
            id: id.to_string(),
            name: name.to_string(),
            image_url: None,
        });
        self
    }

    /// Adds a post created `minutes` after [`base_time`] carrying `comments` comments.
    pub fn with_post(mut self, id: &str, user_id: &str, minutes: i64, comments: usize) -> Self {
        self.posts.push(Post {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: format!("post {id}"),
            content: String::new(),
            created_at: base_time() + ChronoDuration::minutes(minutes),
            image_url: None,
            comment_count: None,
        });
        let list = (0..comments)
            .map(|n| Comment {
                id: format!("{id}-{n}"),
                post_id: id.to_string(),
                content: String::new(),
            })
            .collect();
        self.comments.insert(id.to_string(), list);
        self
    }

    pub fn failing_users(mut self) -> Self {
        self.failing_users = true;
        self
    }

    pub fn failing_posts_for(mut self, user_id: &str) -> Self {
        self.failing_posts.insert(user_id.to_string());
        self
    }

    pub fn failing_comments_for(mut self, post_id: &str) -> Self {
        self.failing_comments.insert(post_id.to_string());
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn simulate_request(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SocialGateway for FakeGateway {
    async fn list_users(&self) -> Result<Vec<User>> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_request().await;
        if self.failing_users {
            return Err(anyhow!("users unavailable"));
        }
        Ok(self.users.clone())
    }

    async fn list_posts_by_user(&self, user_id: &str) -> Result<Vec<Post>> {
        self.simulate_request().await;
        if self.failing_posts.contains(user_id) {
            return Err(anyhow!("posts for {user_id} unavailable"));
        }
        Ok(self
            .posts
            .iter()
            .filter(|post| post.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_comments_by_post(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.simulate_request().await;
        if self.failing_comments.contains(post_id) {
            return Err(anyhow!("comments for {post_id} unavailable"));
        }
        Ok(self.comments.get(post_id).cloned().unwrap_or_default())
    }

    fn max_concurrent_requests(&self) -> usize {
        self.concurrency
            .unwrap_or(crate::config::DEFAULT_MAX_CONCURRENT_REQUESTS)
    }
}
