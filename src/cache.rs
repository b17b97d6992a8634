use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Source of the current time. Swapped for a manual clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A fetched credential together with its advertised lifetime.
#[derive(Debug, Clone)]
pub struct FreshToken {
    pub value: String,
    pub ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Single-slot bearer token cache.
///
/// The stored expiry already has the safety margin subtracted, so a token
/// is served only while `now < expires_at`. The lock is held across the
/// refresh, which means callers arriving during a refresh wait for it and
/// then get the fresh value instead of starting a second exchange.
#[derive(Clone)]
pub struct TokenCache {
    slot: Arc<Mutex<Option<CachedToken>>>,
    margin: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new(margin_secs: i64) -> Self {
        Self::with_clock(margin_secs, Arc::new(SystemClock))
    }

    pub fn with_clock(margin_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            margin: Duration::seconds(margin_secs),
            clock,
        }
    }

    /// Returns the cached token, or runs `fetch` once and caches its result.
    /// Errors from `fetch` are returned as-is and leave the slot empty.
    pub async fn get_or_refresh<F, Fut, E>(&self, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FreshToken, E>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if self.clock.now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
            tracing::debug!("cached token expired at {}", cached.expires_at);
        }
        *slot = None;

        let fresh = fetch().await?;
        let now = self.clock.now();
        let usable = Duration::seconds(fresh.ttl_secs) - self.margin;
        let expires_at = if usable > Duration::zero() {
            now + usable
        } else {
            now
        };

        *slot = Some(CachedToken {
            value: fresh.value.clone(),
            expires_at,
        });
        Ok(fresh.value)
    }

    /// Drops the cached token so the next access refetches.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Current cache entry, if any (expired or not).
    #[cfg(test)]
    pub(crate) async fn peek(&self) -> Option<CachedToken> {
        self.slot.lock().await.clone()
    }
}
