use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    CacheStore, ConfigProvider, WeatherProvider, WeatherRecord,
    cache::DEFAULT_TTL,
    config::ConfigError,
    provider::ProviderError,
};

/// Failures a caller of [`Resolver::resolve`] can see. Cache problems are
/// absorbed by the resolver and never show up here.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream returned an unexpected response: {0}")]
    UpstreamDecode(String),
}

impl From<ProviderError> for ResolveError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => ResolveError::UpstreamUnavailable(msg),
            ProviderError::Decode(msg) => ResolveError::UpstreamDecode(msg),
        }
    }
}

#[derive(Debug, Default)]
struct ResolverStats {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt_entries: AtomicU64,
    cache_read_errors: AtomicU64,
    cache_write_errors: AtomicU64,
    upstream_failures: AtomicU64,
}

impl ResolverStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the resolver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub corrupt_entries: u64,
    pub cache_read_errors: u64,
    pub cache_write_errors: u64,
    pub upstream_failures: u64,
}

/// Cache-aside lookup of current weather.
///
/// Each call probes the cache, falls back to the upstream provider on any
/// kind of miss, and writes a successful upstream result back with a fixed
/// TTL. Calls share nothing but the injected handles, so concurrent misses
/// for one key each go upstream and the last write wins.
#[derive(Debug)]
pub struct Resolver {
    cache: Arc<dyn CacheStore>,
    config: Arc<dyn ConfigProvider>,
    provider: Arc<dyn WeatherProvider>,
    ttl: Duration,
    stats: ResolverStats,
}

impl Resolver {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        config: Arc<dyn ConfigProvider>,
        provider: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self { cache, config, provider, ttl: DEFAULT_TTL, stats: ResolverStats::default() }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> StatsSnapshot {
        let s = &self.stats;
        StatsSnapshot {
            hits: s.hits.load(Ordering::Relaxed),
            misses: s.misses.load(Ordering::Relaxed),
            corrupt_entries: s.corrupt_entries.load(Ordering::Relaxed),
            cache_read_errors: s.cache_read_errors.load(Ordering::Relaxed),
            cache_write_errors: s.cache_write_errors.load(Ordering::Relaxed),
            upstream_failures: s.upstream_failures.load(Ordering::Relaxed),
        }
    }

    /// Resolve current weather for `location`. The key is used verbatim for
    /// both the cache and the upstream request.
    pub async fn resolve(&self, location: &str) -> Result<WeatherRecord, ResolveError> {
        if let Some(record) = self.probe_cache(location).await {
            return Ok(record);
        }

        let record = self.fetch_upstream(location).await?;
        self.populate_cache(location, &record).await;

        Ok(record)
    }

    async fn probe_cache(&self, location: &str) -> Option<WeatherRecord> {
        match self.cache.get(location).await {
            Ok(Some(raw)) => match WeatherRecord::from_json(&raw) {
                Ok(record) => {
                    ResolverStats::bump(&self.stats.hits);
                    debug!(location = %location, "cache hit");
                    Some(record)
                }
                Err(err) => {
                    ResolverStats::bump(&self.stats.corrupt_entries);
                    warn!(location = %location, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                ResolverStats::bump(&self.stats.misses);
                debug!(location = %location, "cache miss");
                None
            }
            Err(err) => {
                ResolverStats::bump(&self.stats.cache_read_errors);
                warn!(location = %location, error = %err, "cache read failed, going upstream");
                None
            }
        }
    }

    async fn fetch_upstream(&self, location: &str) -> Result<WeatherRecord, ResolveError> {
        let config = self.config.load().await?;

        self.provider.current_conditions(location, &config).await.map_err(|err| {
            ResolverStats::bump(&self.stats.upstream_failures);
            warn!(location = %location, error = %err, "upstream fetch failed");
            ResolveError::from(err)
        })
    }

    /// Best effort: the caller already holds a valid record, so a failed
    /// write is counted and logged but never returned.
    async fn populate_cache(&self, location: &str, record: &WeatherRecord) {
        let raw = match record.to_json() {
            Ok(raw) => raw,
            Err(err) => {
                ResolverStats::bump(&self.stats.cache_write_errors);
                warn!(location = %location, error = %err, "could not serialize record for cache");
                return;
            }
        };

        if let Err(err) = self.cache.put(location, &raw, self.ttl).await {
            ResolverStats::bump(&self.stats.cache_write_errors);
            warn!(location = %location, error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ApiConfig, CurrentConditions, StaticConfigProvider,
        cache::{CacheError, ManualClock, MemoryCacheStore},
    };
    use async_trait::async_trait;
    use std::{
        path::PathBuf,
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicUsize},
        },
    };
    use tokio::sync::Barrier;

    fn paris() -> WeatherRecord {
        WeatherRecord {
            address: "Paris".into(),
            current_conditions: CurrentConditions {
                temperature: 18.5,
                humidity: 60.0,
                wind_speed: 10.0,
                description: "Clear".into(),
            },
        }
    }

    const PARIS_JSON: &str = r#"{"address":"Paris","currentConditions":{"temp":18.5,"humidity":60.0,"wspd":10.0,"conditions":"Clear"}}"#;

    #[derive(Debug)]
    enum Reply {
        Record(WeatherRecord),
        Unavailable,
        Decode,
    }

    #[derive(Debug)]
    struct FakeProvider {
        reply: Reply,
        calls: AtomicUsize,
        locations: Mutex<Vec<String>>,
        gate: Option<Barrier>,
    }

    impl FakeProvider {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                locations: Mutex::default(),
                gate: None,
            })
        }

        /// Every call waits until `n` calls are in flight.
        fn gated(reply: Reply, n: usize) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                locations: Mutex::default(),
                gate: Some(Barrier::new(n)),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn current_conditions(
            &self,
            location: &str,
            _config: &ApiConfig,
        ) -> Result<WeatherRecord, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.locations.lock().unwrap().push(location.to_string());
            if let Some(gate) = &self.gate {
                gate.wait().await;
            }

            match &self.reply {
                Reply::Record(record) => {
                    let mut record = record.clone();
                    record.address = location.to_string();
                    Ok(record)
                }
                Reply::Unavailable => Err(ProviderError::Unavailable("connection refused".into())),
                Reply::Decode => Err(ProviderError::Decode("expected value at line 1".into())),
            }
        }
    }

    /// Memory store whose reads and writes can be made to fail.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryCacheStore,
        fail_get: AtomicBool,
        fail_put: AtomicBool,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(CacheError::Transport("connection reset".into()));
            }
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(CacheError::Transport("connection reset".into()));
            }
            self.inner.put(key, value, ttl).await
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct MissingConfig;

    #[async_trait]
    impl ConfigProvider for MissingConfig {
        async fn load(&self) -> Result<ApiConfig, ConfigError> {
            Err(ConfigError::Read {
                path: PathBuf::from(".apiConfig"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn static_config() -> Arc<StaticConfigProvider> {
        Arc::new(StaticConfigProvider(ApiConfig { open_weather_api_key: "KEY".into() }))
    }

    fn resolver(store: Arc<FlakyStore>, provider: Arc<FakeProvider>) -> Resolver {
        Resolver::new(store, static_config(), provider)
    }

    #[tokio::test]
    async fn cache_hit_skips_upstream() {
        let store = Arc::new(FlakyStore::default());
        store.inner.put("Paris", PARIS_JSON, DEFAULT_TTL).await.unwrap();
        let provider = FakeProvider::new(Reply::Unavailable);
        let resolver = resolver(store.clone(), provider.clone());

        let record = resolver.resolve("Paris").await.unwrap();

        assert_eq!(record, paris());
        assert_eq!(provider.calls(), 0);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.stats().hits, 1);
    }

    #[tokio::test]
    async fn miss_fetches_once_and_populates_cache() {
        let store = Arc::new(FlakyStore::default());
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = resolver(store.clone(), provider.clone());

        let record = resolver.resolve("Paris").await.unwrap();
        assert_eq!(record, paris());
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);

        let cached = store.get("Paris").await.unwrap().expect("entry written");
        assert_eq!(WeatherRecord::from_json(&cached).unwrap(), paris());

        assert_eq!(resolver.resolve("Paris").await.unwrap(), paris());
        assert_eq!(provider.calls(), 1);
        assert_eq!(resolver.stats(), StatsSnapshot { hits: 1, misses: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn written_entry_is_the_serialized_record() {
        let store = Arc::new(FlakyStore::default());
        let resolver = resolver(store.clone(), FakeProvider::new(Reply::Record(paris())));

        let record = resolver.resolve("Paris").await.unwrap();

        let cached = store.get("Paris").await.unwrap().unwrap();
        assert_eq!(cached, record.to_json().unwrap());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_soft_miss() {
        let store = Arc::new(FlakyStore::default());
        store.inner.put("X", "\u{0}not json", DEFAULT_TTL).await.unwrap();
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = resolver(store.clone(), provider.clone());

        let record = resolver.resolve("X").await.unwrap();

        assert_eq!(record.address, "X");
        assert_eq!(provider.calls(), 1);

        let cached = store.get("X").await.unwrap().unwrap();
        assert_eq!(WeatherRecord::from_json(&cached).unwrap(), record);
        assert_eq!(resolver.stats().corrupt_entries, 1);
    }

    #[tokio::test]
    async fn cache_read_failure_falls_through_to_upstream() {
        let store = Arc::new(FlakyStore::default());
        store.fail_get.store(true, Ordering::SeqCst);
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = resolver(store.clone(), provider.clone());

        assert_eq!(resolver.resolve("Paris").await.unwrap(), paris());
        assert_eq!(resolver.resolve("Paris").await.unwrap(), paris());

        assert_eq!(provider.calls(), 2);
        assert_eq!(resolver.stats().cache_read_errors, 2);
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_and_skips_write() {
        let store = Arc::new(FlakyStore::default());
        let provider = FakeProvider::new(Reply::Unavailable);
        let resolver = resolver(store.clone(), provider.clone());

        let err = resolver.resolve("Paris").await.unwrap_err();

        assert!(matches!(err, ResolveError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.stats().upstream_failures, 1);
    }

    #[tokio::test]
    async fn undecodable_upstream_response_is_decode_error() {
        let store = Arc::new(FlakyStore::default());
        let resolver = resolver(store.clone(), FakeProvider::new(Reply::Decode));

        let err = resolver.resolve("Paris").await.unwrap_err();

        assert!(matches!(err, ResolveError::UpstreamDecode(_)));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn config_failure_stops_before_upstream() {
        let store = Arc::new(FlakyStore::default());
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = Resolver::new(store.clone(), Arc::new(MissingConfig), provider.clone());

        let err = resolver.resolve("Paris").await.unwrap_err();

        assert!(matches!(err, ResolveError::Config(ConfigError::Read { .. })));
        assert!(err.to_string().contains(".apiConfig"));
        assert_eq!(provider.calls(), 0);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_hit_needs_no_config() {
        let store = Arc::new(FlakyStore::default());
        store.inner.put("Paris", PARIS_JSON, DEFAULT_TTL).await.unwrap();
        let resolver =
            Resolver::new(store, Arc::new(MissingConfig), FakeProvider::new(Reply::Unavailable));

        assert_eq!(resolver.resolve("Paris").await.unwrap(), paris());
    }

    #[tokio::test]
    async fn cache_write_failure_is_swallowed() {
        let store = Arc::new(FlakyStore::default());
        store.fail_put.store(true, Ordering::SeqCst);
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = resolver(store.clone(), provider.clone());

        let record = resolver.resolve("Paris").await.unwrap();

        assert_eq!(record, paris());
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.get("Paris").await.unwrap(), None);
        assert_eq!(resolver.stats().cache_write_errors, 1);
    }

    #[tokio::test]
    async fn keys_are_not_normalized() {
        let store = Arc::new(FlakyStore::default());
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = resolver(store.clone(), provider.clone());

        resolver.resolve("paris").await.unwrap();
        let upper = resolver.resolve("Paris").await.unwrap();

        assert_eq!(upper.address, "Paris");
        assert_eq!(provider.calls(), 2);
        assert_eq!(*provider.locations.lock().unwrap(), vec!["paris", "Paris"]);
        assert!(store.get("paris").await.unwrap().is_some());
        assert!(store.get("Paris").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
        let provider = FakeProvider::new(Reply::Record(paris()));
        let resolver = Resolver::new(store.clone(), static_config(), provider.clone());

        resolver.resolve("Paris").await.unwrap();
        clock.advance(Duration::from_secs(9 * 60 + 59));
        resolver.resolve("Paris").await.unwrap();
        assert_eq!(provider.calls(), 1);

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("Paris").await.unwrap(), None);

        resolver.resolve("Paris").await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn custom_ttl_is_passed_to_store() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
        let resolver =
            Resolver::new(store.clone(), static_config(), FakeProvider::new(Reply::Record(paris())))
                .with_ttl(Duration::from_secs(30));
        assert_eq!(resolver.ttl(), Duration::from_secs(30));

        resolver.resolve("Paris").await.unwrap();
        clock.advance(Duration::from_secs(30));

        assert_eq!(store.get("Paris").await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_misses_each_go_upstream() {
        let store = Arc::new(FlakyStore::default());
        let provider = FakeProvider::gated(Reply::Record(paris()), 2);
        let resolver = resolver(store.clone(), provider.clone());

        let (a, b) = tokio::join!(resolver.resolve("Paris"), resolver.resolve("Paris"));

        assert_eq!(a.unwrap(), paris());
        assert_eq!(b.unwrap(), paris());
        assert_eq!(provider.calls(), 2);
        assert_eq!(store.puts.load(Ordering::SeqCst), 2);
        assert!(store.get("Paris").await.unwrap().is_some());
    }
}
