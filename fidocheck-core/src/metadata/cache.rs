//! Time-bounded cache in front of a metadata BLOB provider.
//!
//! State machine:
//! - `Empty`: every call fetches; a failure is returned to the caller.
//! - `Cached`: served as-is until `today >= nextUpdate` and at least the
//!   debounce interval has passed since the last refresh attempt. A failed or
//!   timed-out refresh keeps serving the previous snapshot.
//!
//! Readers never wait on a refresh when a snapshot exists; only the very
//! first load makes concurrent callers queue behind the in-flight fetch.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use super::model::MetadataBlobPayload;
use super::{MetadataBlobProvider, MetadataError};

/// Source of "now" for refresh decisions.
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

/// Manually driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
enum CacheState {
    Empty,
    Cached {
        payload: Arc<MetadataBlobPayload>,
        next_update: NaiveDate,
        /// Time of the last refresh attempt, successful or not.
        last_refresh: DateTime<Utc>,
    },
}

pub struct CachingBlobProvider<P> {
    inner: P,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    refresh_debounce: chrono::Duration,
    state: RwLock<CacheState>,
    refresh: tokio::sync::Mutex<()>,
}

impl<P: MetadataBlobProvider> CachingBlobProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_clock(inner, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            clock,
            fetch_timeout: Duration::from_secs(30),
            refresh_debounce: chrono::Duration::hours(1),
            state: RwLock::new(CacheState::Empty),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn refresh_debounce(mut self, debounce: Duration) -> Self {
        self.refresh_debounce =
            chrono::Duration::from_std(debounce).unwrap_or(chrono::Duration::hours(1));
        self
    }

    /// The current snapshot without triggering a refresh.
    pub fn snapshot(&self) -> Option<Arc<MetadataBlobPayload>> {
        match &*self.read_state() {
            CacheState::Cached { payload, .. } => Some(Arc::clone(payload)),
            CacheState::Empty => None,
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self, state: CacheState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// `Some(snapshot)` when the cached payload can be served without refreshing.
    fn fresh_snapshot(&self) -> Option<Arc<MetadataBlobPayload>> {
        let now = self.clock.now();
        match &*self.read_state() {
            CacheState::Cached {
                payload,
                next_update,
                last_refresh,
            } => {
                let due = now.date_naive() >= *next_update
                    && now >= *last_refresh + self.refresh_debounce;
                (!due).then(|| Arc::clone(payload))
            }
            CacheState::Empty => None,
        }
    }

    #[instrument(skip(self))]
    async fn refresh_locked(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
        // Another caller may have refreshed while we waited for the guard.
        if let Some(payload) = self.fresh_snapshot() {
            return Ok(payload);
        }

        let started = self.clock.now();
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.inner.provide()).await {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout(self.fetch_timeout)),
        };

        match fetched {
            Ok(payload) => {
                info!(
                    no = payload.no,
                    next_update = %payload.next_update,
                    "metadata cache refreshed"
                );
                self.write_state(CacheState::Cached {
                    next_update: payload.next_update,
                    payload: Arc::clone(&payload),
                    last_refresh: started,
                });
                Ok(payload)
            }
            Err(err) => {
                let stale = self.read_state().clone();
                match stale {
                    CacheState::Cached {
                        payload,
                        next_update,
                        ..
                    } => {
                        warn!(error = %err, "metadata refresh failed, serving stale BLOB");
                        self.write_state(CacheState::Cached {
                            payload: Arc::clone(&payload),
                            next_update,
                            last_refresh: started,
                        });
                        Ok(payload)
                    }
                    CacheState::Empty => {
                        warn!(error = %err, "initial metadata fetch failed");
                        Err(err)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<P: MetadataBlobProvider> MetadataBlobProvider for CachingBlobProvider<P> {
    async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
        if let Some(payload) = self.fresh_snapshot() {
            return Ok(payload);
        }

        match self.refresh.try_lock() {
            Ok(_guard) => self.refresh_locked().await,
            Err(_) => {
                if let Some(stale) = self.snapshot() {
                    debug!("refresh in flight, serving current snapshot");
                    return Ok(stale);
                }
                let _guard = self.refresh.lock().await;
                self.refresh_locked().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        next_update: NaiveDate,
    }

    impl CountingProvider {
        fn new(next_update: NaiveDate) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                next_update,
            }
        }
    }

    #[async_trait]
    impl MetadataBlobProvider for CountingProvider {
        async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            if self.fail.load(Ordering::SeqCst) {
                return Err(MetadataError::HttpStatus(503));
            }
            Ok(Arc::new(MetadataBlobPayload {
                legal_header: None,
                no: n + 1,
                next_update: self.next_update,
                entries: Vec::new(),
            }))
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_serves_cached_until_next_update() {
        let inner = Arc::new(CountingProvider::new(day(10)));
        let clock = Arc::new(FixedClock::new(at(1, 0)));
        let cache = CachingBlobProvider::with_clock(Arc::clone(&inner), clock.clone());

        assert_eq!(cache.provide().await.unwrap().no, 1);
        clock.set(at(9, 23));
        assert_eq!(cache.provide().await.unwrap().no, 1);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        clock.set(at(10, 0));
        assert_eq!(cache.provide().await.unwrap().no, 2);
    }

    #[tokio::test]
    async fn test_refresh_is_debounced() {
        let inner = Arc::new(CountingProvider::new(day(1)));
        let clock = Arc::new(FixedClock::new(at(2, 0)));
        let cache = CachingBlobProvider::with_clock(Arc::clone(&inner), clock.clone());

        cache.provide().await.unwrap();
        clock.advance(chrono::Duration::minutes(30));
        cache.provide().await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::minutes(31));
        cache.provide().await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_snapshot() {
        let inner = Arc::new(CountingProvider::new(day(1)));
        let clock = Arc::new(FixedClock::new(at(2, 0)));
        let cache = CachingBlobProvider::with_clock(Arc::clone(&inner), clock.clone());

        assert_eq!(cache.provide().await.unwrap().no, 1);
        inner.fail.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(cache.provide().await.unwrap().no, 1);

        // The failed attempt counts for debouncing.
        clock.advance(chrono::Duration::minutes(10));
        cache.provide().await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_cache_failure_is_error() {
        let inner = Arc::new(CountingProvider::new(day(1)));
        inner.fail.store(true, Ordering::SeqCst);
        let cache = CachingBlobProvider::with_clock(
            Arc::clone(&inner),
            Arc::new(FixedClock::new(at(2, 0))),
        );
        assert!(matches!(cache.provide().await, Err(MetadataError::HttpStatus(503))));
        assert!(cache.snapshot().is_none());
    }

    struct SlowProvider;

    #[async_trait]
    impl MetadataBlobProvider for SlowProvider {
        async fn provide(&self) -> Result<Arc<MetadataBlobPayload>, MetadataError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Err(MetadataError::Io("unreachable".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let cache = CachingBlobProvider::with_clock(SlowProvider, Arc::new(FixedClock::new(at(1, 0))))
            .fetch_timeout(Duration::from_secs(5));
        assert!(matches!(cache.provide().await, Err(MetadataError::Timeout(_))));
    }
}
