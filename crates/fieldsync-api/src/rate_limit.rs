use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fieldsync_core::util::user_fingerprint;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window request limiter keyed by endpoint class and user
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<(EndpointClass, String), RateWindow>>>,
    window: Duration,
    batch_limit: u32,
    write_limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// `POST /v1/sync/batch`
    SyncBatch,
    /// Single-operation inspection writes and conflict resolution
    Write,
}

#[derive(Default)]
struct RateLimitMetrics {
    batch_allowed: AtomicU64,
    batch_limited: AtomicU64,
    write_allowed: AtomicU64,
    write_limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub batch_allowed: u64,
    pub batch_limited: u64,
    pub write_allowed: u64,
    pub write_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.sync_batch_rate_limit_per_window,
            config.write_rate_limit_per_window,
        )
    }

    fn new(window: Duration, batch_limit: u32, write_limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            batch_limit,
            write_limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, class: EndpointClass, user_id: &str) -> Result<(), AppError> {
        let limit = match class {
            EndpointClass::SyncBatch => self.batch_limit,
            EndpointClass::Write => self.write_limit,
        };

        let now = Instant::now();
        let key = (class, user_id.to_string());
        let mut windows = self.state.lock().await;
        let open = |window: &RateWindow| now.duration_since(window.started_at) < self.window;
        if !windows.get(&key).is_some_and(open) {
            // Expired windows of every user are dropped whenever a new one starts
            windows.retain(|_, window| open(&*window));
        }
        let entry = windows.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.counter(class, false).fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = class.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::TooManyRequests { retry_after_secs });
        }

        entry.count += 1;
        self.counter(class, true).fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            batch_allowed: self.metrics.batch_allowed.load(Ordering::Relaxed),
            batch_limited: self.metrics.batch_limited.load(Ordering::Relaxed),
            write_allowed: self.metrics.write_allowed.load(Ordering::Relaxed),
            write_limited: self.metrics.write_limited.load(Ordering::Relaxed),
        }
    }

    fn counter(&self, class: EndpointClass, allowed: bool) -> &AtomicU64 {
        match (class, allowed) {
            (EndpointClass::SyncBatch, true) => &self.metrics.batch_allowed,
            (EndpointClass::SyncBatch, false) => &self.metrics.batch_limited,
            (EndpointClass::Write, true) => &self.metrics.write_allowed,
            (EndpointClass::Write, false) => &self.metrics.write_limited,
        }
    }
}

impl EndpointClass {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SyncBatch => "sync_batch",
            Self::Write => "write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2, 10);

        limiter.check(EndpointClass::SyncBatch, "user-a").await.unwrap();
        limiter.check(EndpointClass::SyncBatch, "user-a").await.unwrap();

        let err = limiter
            .check(EndpointClass::SyncBatch, "user-a")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::TooManyRequests { retry_after_secs } if retry_after_secs >= 1
        ));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.batch_allowed, 2);
        assert_eq!(metrics.batch_limited, 1);
    }

    #[tokio::test]
    async fn classes_and_users_have_separate_windows() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 1);

        limiter.check(EndpointClass::SyncBatch, "user-a").await.unwrap();
        limiter.check(EndpointClass::Write, "user-a").await.unwrap();
        limiter.check(EndpointClass::SyncBatch, "user-b").await.unwrap();

        assert!(limiter.check(EndpointClass::Write, "user-a").await.is_err());
        assert_eq!(limiter.metrics_snapshot().write_limited, 1);
    }

    #[tokio::test]
    async fn expired_windows_are_dropped_when_a_new_one_starts() {
        let limiter = EndpointRateLimiter::new(Duration::ZERO, 5, 5);

        limiter.check(EndpointClass::SyncBatch, "user-a").await.unwrap();
        limiter.check(EndpointClass::Write, "user-a").await.unwrap();
        limiter.check(EndpointClass::SyncBatch, "user-b").await.unwrap();
        assert_eq!(limiter.state.lock().await.len(), 1);

        let lasting = EndpointRateLimiter::new(Duration::from_secs(60), 5, 5);
        lasting.check(EndpointClass::SyncBatch, "user-a").await.unwrap();
        lasting.check(EndpointClass::SyncBatch, "user-b").await.unwrap();
        assert_eq!(lasting.state.lock().await.len(), 2);
    }
}
