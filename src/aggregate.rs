//! Derived dashboard views built on top of a [`SocialGateway`].
//!
//! None of these add fallback behaviour of their own. Whatever the gateway
//! returns as an error is handed straight back to the caller.

use anyhow::Result;

use crate::gateway::{posts_for_users, with_comment_counts, SocialGateway};
use crate::models::{user_lookup, Feed, Post, RankedUser, TrendingPosts, User};

pub const TOP_USERS_LIMIT: usize = 5;

/// Users ranked by the total number of comments on their posts, at most
/// [`TOP_USERS_LIMIT`] of them.
pub async fn top_users<G>(gateway: &G) -> Result<Vec<RankedUser>>
where
    G: SocialGateway + ?Sized,
{
    let users = gateway.list_users().await?;
    let posts = posts_for_users(gateway, &users).await?;

    // Count every post in one fan-out, then fold the counts back per user
    let per_user: Vec<usize> = posts.iter().map(Vec::len).collect();
    let counted = with_comment_counts(gateway, posts.into_iter().flatten().collect()).await?;
    let mut counted = counted.into_iter();

    let totals = users
        .into_iter()
        .zip(per_user)
        .map(|(user, len)| RankedUser {
            user,
            comment_count: counted.by_ref().take(len).map(|post| post.comments()).sum(),
        })
        .collect();

    Ok(rank_users(totals))
}

/// Stable descending sort on comment totals, so equal totals keep the order
/// the gateway listed the users in.
pub fn rank_users(mut totals: Vec<RankedUser>) -> Vec<RankedUser> {
    totals.sort_by(|a, b| b.comment_count.cmp(&a.comment_count));
    totals.truncate(TOP_USERS_LIMIT);
    totals
}

/// Posts sharing the highest comment count, with their authors.
pub async fn trending_posts<G>(gateway: &G) -> Result<TrendingPosts>
where
    G: SocialGateway + ?Sized,
{
    let posts = gateway.list_all_posts_with_comment_counts().await;
    let posts = select_trending(posts);
    if posts.is_empty() {
        return Ok(TrendingPosts::default());
    }

    let users = gateway.list_users().await?;
    Ok(TrendingPosts {
        posts,
        users: user_lookup(&users),
    })
}

pub fn select_trending(posts: Vec<Post>) -> Vec<Post> {
    let max = posts.iter().map(Post::comments).max().unwrap_or(0);
    posts
        .into_iter()
        .filter(|post| post.comments() == max)
        .collect()
}

/// Every post of every user, newest first.
pub async fn feed<G>(gateway: &G) -> Result<Feed>
where
    G: SocialGateway + ?Sized,
{
    let users: Vec<User> = gateway.list_users().await?;
    let posts = posts_for_users(gateway, &users).await?;
    let posts = with_comment_counts(gateway, posts.into_iter().flatten().collect()).await?;

    Ok(Feed {
        posts: newest_first(posts),
        users: user_lookup(&users),
    })
}

pub fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}
