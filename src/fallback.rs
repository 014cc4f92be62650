//! Bundled dataset served whenever the remote service can't be reached or
//! answers with something we can't use.

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;

use crate::models::{Comment, Post, User};

fn user(id: &str, name: &str, image_url: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        image_url: Some(image_url.to_string()),
    }
}

fn post(id: &str, user_id: &str, title: &str, content: &str, hours_ago: i64, seed: &str) -> Post {
    Post {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        created_at: *STARTED_AT - Duration::hours(hours_ago),
        image_url: Some(format!("https://picsum.photos/seed/{}/600/400", seed)),
        comment_count: None,
    }
}

fn comment(id: &str, post_id: &str, content: &str) -> Comment {
    Comment {
        id: id.to_string(),
        post_id: post_id.to_string(),
        content: content.to_string(),
    }
}

lazy_static! {
    static ref STARTED_AT: DateTime<Utc> = Utc::now();

    pub static ref USERS: Vec<User> = vec![
        user("1", "Sarah Johnson", "https://randomuser.me/api/portraits/women/1.jpg"),
        user("2", "Michael Chen", "https://randomuser.me/api/portraits/men/2.jpg"),
        user("3", "Emma Wilson", "https://randomuser.me/api/portraits/women/3.jpg"),
        user("4", "David Brown", "https://randomuser.me/api/portraits/men/4.jpg"),
        user("5", "Lisa Anderson", "https://randomuser.me/api/portraits/women/5.jpg"),
    ];

    // Timestamps are relative to process start; `main` forces them during startup
    pub static ref POSTS: Vec<Post> = vec![
        post(
            "1",
            "1",
            "The Future of AI in Social Media",
            "Artificial Intelligence is changing how we interact on social platforms, from personalized recommendations to automated moderation.",
            1,
            "ai",
        ),
        post(
            "2",
            "2",
            "Sustainable Living Tips",
            "Small changes in our daily lives can make a big impact on our planet. Here are some easy sustainable habits anyone can adopt.",
            2,
            "eco",
        ),
        post(
            "3",
            "3",
            "Remote Work Best Practices",
            "Working remotely needs a different approach to productivity and collaboration. These practices help you stay connected with your team.",
            3,
            "work",
        ),
    ];

    pub static ref COMMENTS: Vec<Comment> = vec![
        comment("1", "1", "This is really insightful! AI's impact on social media is fascinating."),
        comment("2", "1", "Great analysis of the current trends in AI and social platforms."),
        comment("3", "2", "These sustainable living tips are exactly what I needed!"),
    ];
}

/// Builds the dataset now so its timestamps are anchored to startup rather
/// than to the first fallback.
pub fn initialize() {
    lazy_static::initialize(&STARTED_AT);
    lazy_static::initialize(&USERS);
    lazy_static::initialize(&POSTS);
    lazy_static::initialize(&COMMENTS);
}

pub fn users() -> Vec<User> {
    USERS.clone()
}

pub fn posts_by_user(user_id: &str) -> Vec<Post> {
    POSTS
        .iter()
        .filter(|post| post.user_id == user_id)
        .cloned()
        .collect()
}

pub fn comments_by_post(post_id: &str) -> Vec<Comment> {
    COMMENTS
        .iter()
        .filter(|comment| comment.post_id == post_id)
        .cloned()
        .collect()
}
