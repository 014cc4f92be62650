use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use crate::cache::DEFAULT_TTL;

pub const DEFAULT_BASE_URL: &str = "http://20.244.56.144/evaluation-service";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Upper bound on outbound requests issued at once during a fan-out.
    pub max_concurrent_requests: usize,
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            log_level: "info".to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("SOCIAL_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);

        let cache_ttl = secs(&lookup, "SOCIAL_CACHE_TTL_SECS")?.unwrap_or(defaults.cache_ttl);
        let poll_interval =
            secs(&lookup, "SOCIAL_POLL_INTERVAL_SECS")?.unwrap_or(defaults.poll_interval);
        let request_timeout =
            secs(&lookup, "SOCIAL_REQUEST_TIMEOUT_SECS")?.unwrap_or(defaults.request_timeout);

        let max_concurrent_requests = match lookup("SOCIAL_MAX_CONCURRENT_REQUESTS") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("SOCIAL_MAX_CONCURRENT_REQUESTS={raw:?} is not a number"))?
                .max(1),
            None => defaults.max_concurrent_requests,
        };

        if poll_interval.is_zero() {
            return Err(anyhow!("SOCIAL_POLL_INTERVAL_SECS must be greater than zero"));
        }

        Ok(Self {
            api_base_url,
            cache_ttl,
            poll_interval,
            request_timeout,
            max_concurrent_requests,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{key}={raw:?} is not a number of seconds"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<DashboardConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DashboardConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("SOCIAL_API_BASE_URL", "http://localhost:9000/api/"),
            ("SOCIAL_CACHE_TTL_SECS", "30"),
            ("SOCIAL_POLL_INTERVAL_SECS", "5"),
            ("SOCIAL_MAX_CONCURRENT_REQUESTS", "0"),
            ("LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(config.api_base_url, "http://localhost:9000/api");
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_concurrent_requests, 1);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = config_from(&[("SOCIAL_CACHE_TTL_SECS", "five")]).unwrap_err();
        assert!(err.to_string().contains("SOCIAL_CACHE_TTL_SECS"));
        assert!(config_from(&[("SOCIAL_POLL_INTERVAL_SECS", "0")]).is_err());
    }
}
