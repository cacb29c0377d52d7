//! Sliding-window rate limiting for room creation and join attempts, keyed by app id
//! rather than by client, since the lobby must reject abusive `Create`/`Join*` calls
//! before a client has been admitted to any room and issued an identity.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct RateLimitEntry {
    room_creations: u32,
    join_attempts: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self { room_creations: 0, join_attempts: 0, window_start: Instant::now() }
    }

    fn maybe_reset_window(&mut self, window: Duration) {
        if self.window_start.elapsed() >= window {
            self.room_creations = 0;
            self.join_attempts = 0;
            self.window_start = Instant::now();
        }
    }

    fn try_room_creation(&mut self, config: &RateLimitConfig) -> bool {
        let window = Duration::from_secs(config.time_window_secs);
        self.maybe_reset_window(window);
        if self.room_creations < config.max_room_creations {
            self.room_creations += 1;
            self.join_attempts += 1;
            true
        } else {
            false
        }
    }

    fn try_join_attempt(&mut self, config: &RateLimitConfig) -> bool {
        let window = Duration::from_secs(config.time_window_secs);
        self.maybe_reset_window(window);
        if self.join_attempts < config.max_join_attempts {
            self.join_attempts += 1;
            true
        } else {
            false
        }
    }

    fn time_until_reset(&self, config: &RateLimitConfig) -> Duration {
        let elapsed = self.window_start.elapsed();
        Duration::from_secs(config.time_window_secs).saturating_sub(elapsed)
    }
}

/// Rate limiter for `Create`/`Join*` requests, one entry per app id.
pub struct AppRateLimiter {
    config: RateLimitConfig,
    entries: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
}

impl AppRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn check_room_creation(&self, app_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(app_id.to_string()).or_insert_with(RateLimitEntry::new);
        if entry.try_room_creation(&self.config) {
            Ok(())
        } else {
            Err(RateLimitError::RoomCreationLimitExceeded {
                retry_after: entry.time_until_reset(&self.config),
            })
        }
    }

    pub async fn check_join_attempt(&self, app_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(app_id.to_string()).or_insert_with(RateLimitEntry::new);
        if entry.try_join_attempt(&self.config) {
            Ok(())
        } else {
            Err(RateLimitError::JoinLimitExceeded {
                retry_after: entry.time_until_reset(&self.config),
            })
        }
    }

    pub async fn cleanup_old_entries(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let cleanup_threshold = Duration::from_secs(self.config.time_window_secs) * 2;
        entries.retain(|_, entry| now.duration_since(entry.window_start) < cleanup_threshold);
    }

    pub fn start_cleanup_task(self: Arc<Self>) {
        let limiter = Arc::clone(&self);
        let interval = Duration::from_secs(limiter.config.time_window_secs).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                limiter.cleanup_old_entries().await;
            }
        });
    }
}

#[derive(Debug, Clone)]
pub enum RateLimitError {
    RoomCreationLimitExceeded { retry_after: Duration },
    JoinLimitExceeded { retry_after: Duration },
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoomCreationLimitExceeded { retry_after } => write!(
                f,
                "room creation rate limit exceeded, retry in {}s",
                retry_after.as_secs()
            ),
            Self::JoinLimitExceeded { retry_after } => write!(
                f,
                "join attempt rate limit exceeded, retry in {}s",
                retry_after.as_secs()
            ),
        }
    }
}

impl std::error::Error for RateLimitError {}

impl From<RateLimitError> for crate::protocol::AppError {
    fn from(err: RateLimitError) -> Self {
        Self::ResourceExhausted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig { max_room_creations: 2, time_window_secs: 60, max_join_attempts: 3 }
    }

    #[tokio::test]
    async fn room_creation_limit_enforced() {
        let limiter = AppRateLimiter::new(test_config());
        assert!(limiter.check_room_creation("app1").await.is_ok());
        assert!(limiter.check_room_creation("app1").await.is_ok());
        assert!(limiter.check_room_creation("app1").await.is_err());
    }

    #[tokio::test]
    async fn join_attempt_limit_enforced() {
        let limiter = AppRateLimiter::new(test_config());
        assert!(limiter.check_join_attempt("app1").await.is_ok());
        assert!(limiter.check_join_attempt("app1").await.is_ok());
        assert!(limiter.check_join_attempt("app1").await.is_ok());
        assert!(limiter.check_join_attempt("app1").await.is_err());
    }

    #[tokio::test]
    async fn different_apps_have_independent_limits() {
        let limiter = AppRateLimiter::new(test_config());
        assert!(limiter.check_room_creation("app1").await.is_ok());
        assert!(limiter.check_room_creation("app1").await.is_ok());
        assert!(limiter.check_room_creation("app1").await.is_err());
        assert!(limiter.check_room_creation("app2").await.is_ok());
    }

    #[tokio::test]
    async fn room_creation_counts_as_join_attempt() {
        let limiter = AppRateLimiter::new(test_config());
        assert!(limiter.check_room_creation("app1").await.is_ok());
        assert!(limiter.check_room_creation("app1").await.is_ok());
        assert!(limiter.check_join_attempt("app1").await.is_ok());
        assert!(limiter.check_join_attempt("app1").await.is_err());
    }
}
