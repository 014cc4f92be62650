use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::aggregate;
use crate::gateway::SocialGateway;
use crate::models::{Feed, RankedUser, TrendingPosts};
use crate::poller::Poller;

/// The three dashboard views, each kept fresh by its own poller over one
/// shared gateway.
pub struct Dashboard<G: ?Sized> {
    gateway: Arc<G>,
    pub top_users: Poller<Vec<RankedUser>>,
    pub trending: Poller<TrendingPosts>,
    pub feed: Poller<Feed>,
}

impl<G> Dashboard<G>
where
    G: SocialGateway + ?Sized + 'static,
{
    pub fn start(gateway: Arc<G>, period: Duration) -> Self {
        let top_users = {
            let gateway = gateway.clone();
            Poller::start("top_users", period, move || {
                let gateway = gateway.clone();
                async move { aggregate::top_users(&*gateway).await }
            })
        };

        let trending = {
            let gateway = gateway.clone();
            Poller::start("trending", period, move || {
                let gateway = gateway.clone();
                async move { aggregate::trending_posts(&*gateway).await }
            })
        };

        let feed = {
            let gateway = gateway.clone();
            Poller::start("feed", period, move || {
                let gateway = gateway.clone();
                async move { aggregate::feed(&*gateway).await }
            })
        };

        Self {
            gateway,
            top_users,
            trending,
            feed,
        }
    }

    /// Asks every idle view to refresh. Returns how many actually started.
    pub fn refresh_all(&self) -> usize {
        [
            self.top_users.refresh(),
            self.trending.refresh(),
            self.feed.refresh(),
        ]
        .into_iter()
        .filter(|started| *started)
        .count()
    }

    /// Like [`Dashboard::refresh_all`] but drops cached responses first.
    pub fn force_refresh_all(&self) -> usize {
        self.gateway.clear_cache();
        self.refresh_all()
    }

    pub fn shutdown(&mut self) {
        self.top_users.shutdown();
        self.trending.shutdown();
        self.feed.shutdown();
        info!("dashboard stopped");
    }
}
