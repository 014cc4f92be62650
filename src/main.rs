use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use social_insight::config::DashboardConfig;
use social_insight::dashboard::Dashboard;
use social_insight::fallback;
use social_insight::gateway::HttpGateway;
use social_insight::models::{Feed, RankedUser, TrendingPosts};
use social_insight::poller::ViewSnapshot;

fn init_tracing(config: &DashboardConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

fn status<V>(snapshot: &ViewSnapshot<V>) -> &'static str {
    match (snapshot.loading, snapshot.refreshing, snapshot.error.is_some()) {
        (true, _, _) => "loading",
        (_, true, _) => "refreshing",
        (_, _, true) => "error",
        _ => "ok",
    }
}

fn print_top_users(snapshot: &ViewSnapshot<Vec<RankedUser>>) {
    println!("== Top users [{}]", status(snapshot));
    if let Some(error) = &snapshot.error {
        println!("   ! {}", error);
    }
    match &snapshot.data {
        Some(ranked) if ranked.is_empty() => println!("   no user data available"),
        Some(ranked) => {
            for (rank, entry) in ranked.iter().enumerate() {
                println!(
                    "   #{} {} ({} comments)",
                    rank + 1,
                    entry.user.name,
                    entry.comment_count
                );
            }
        }
        None => {}
    }
}

fn print_trending(snapshot: &ViewSnapshot<TrendingPosts>) {
    println!("== Trending posts [{}]", status(snapshot));
    if let Some(error) = &snapshot.error {
        println!("   ! {}", error);
    }
    match &snapshot.data {
        Some(trending) if trending.posts.is_empty() => println!("   no trending posts available"),
        Some(trending) => {
            for post in &trending.posts {
                let author = trending
                    .users
                    .get(&post.user_id)
                    .map(|u| u.name.as_str())
                    .unwrap_or("unknown");
                println!("   {} by {} ({} comments)", post.title, author, post.comments());
            }
        }
        None => {}
    }
}

fn print_feed(snapshot: &ViewSnapshot<Feed>) {
    println!("== Feed [{}]", status(snapshot));
    if let Some(error) = &snapshot.error {
        println!("   ! {}", error);
    }
    match &snapshot.data {
        Some(feed) if feed.posts.is_empty() => println!("   no posts available"),
        Some(feed) => {
            for post in &feed.posts {
                let author = feed
                    .users
                    .get(&post.user_id)
                    .map(|u| u.name.as_str())
                    .unwrap_or("unknown");
                println!(
                    "   {} {} by {} ({} comments)",
                    post.created_at.format("%b %d %H:%M"),
                    post.title,
                    author,
                    post.comments()
                );
            }
        }
        None => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fallback::initialize();
    dotenv::dotenv().ok();
    let config = DashboardConfig::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!(
        base_url = %config.api_base_url,
        poll_secs = config.poll_interval.as_secs(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "starting social insight dashboard"
    );

    let gateway = Arc::new(HttpGateway::new(&config)?);
    let mut dashboard = Dashboard::start(gateway, config.poll_interval);

    let mut top_users = dashboard.top_users.subscribe();
    let mut trending = dashboard.trending.subscribe();
    let mut feed = dashboard.feed.subscribe();
    let mut commands = BufReader::new(tokio::io::stdin()).lines();

    println!("commands: r = refresh, f = force refresh (skip cache), q = quit");

    loop {
        tokio::select! {
            Ok(()) = top_users.changed() => {
                let snapshot = top_users.borrow_and_update().clone();
                print_top_users(&snapshot);
            }
            Ok(()) = trending.changed() => {
                let snapshot = trending.borrow_and_update().clone();
                print_trending(&snapshot);
            }
            Ok(()) = feed.changed() => {
                let snapshot = feed.borrow_and_update().clone();
                print_feed(&snapshot);
            }
            line = commands.next_line() => {
                match line {
                    Ok(Some(line)) => match line.trim() {
                        "r" => {
                            let started = dashboard.refresh_all();
                            info!(started, "manual refresh");
                        }
                        "f" => {
                            let started = dashboard.force_refresh_all();
                            info!(started, "forced refresh");
                        }
                        "q" => break,
                        "" => {}
                        other => warn!(command = other, "unknown command"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    dashboard.shutdown();
    Ok(())
}
