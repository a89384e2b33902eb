//! Background refresh and the public cache handle.

use std::sync::Arc;
use std::time::Duration;

use metar_core::{CacheConfig, ConfigError, MetarError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::fetch::FeedClient;
use crate::store::StationStore;
use crate::types::AirportData;

/// Lifecycle of the refresh loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Spawned but not yet polled by the runtime
    Created,
    Running,
    /// Terminal
    Stopped,
}

/// One refresh cycle: fetch with retries, then merge into the store.
///
/// Returns whether anything was merged. A failed cycle leaves the store
/// untouched.
pub async fn run_cycle(client: &FeedClient, store: &StationStore) -> bool {
    tracing::debug!("Starting METAR refresh cycle");

    match client.fetch().await {
        Some(batch) => {
            let applied = store.merge(batch);
            tracing::info!(
                "METAR refresh merged {} records ({} stations known)",
                applied,
                store.len()
            );
            true
        }
        None => {
            tracing::warn!(
                "METAR refresh produced no data, keeping {} cached stations",
                store.len()
            );
            false
        }
    }
}

async fn refresh_loop(
    client: FeedClient,
    store: Arc<StationStore>,
    state: Arc<Mutex<LoopState>>,
    cancel: CancellationToken,
    period: Duration,
) {
    *state.lock() = LoopState::Running;
    tracing::info!("METAR refresh loop started, period {:?}", period);

    // The first tick fires immediately, so a new cache fills right away.
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                run_cycle(&client, &store).await;
            }
        }
    }

    *state.lock() = LoopState::Stopped;
    tracing::info!("METAR refresh loop stopped");
}

/// In-memory METAR cache refreshed in the background.
///
/// Lookups are synchronous and never wait on the network. The refresh loop
/// runs until [`MetarCache::shutdown`] is called; dropping the handle does
/// not stop it.
#[derive(Debug)]
pub struct MetarCache {
    store: Arc<StationStore>,
    state: Arc<Mutex<LoopState>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetarCache {
    /// Validate `config` and start a cache refreshing every
    /// `config.refresh_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config, when the HTTP client cannot
    /// be built, or when called outside a tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self, MetarError> {
        let validation = config.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }
        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        let client = FeedClient::new(&config)?;
        Self::spawn(client, config.refresh_period())
    }

    /// Start a cache around an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero period or when called outside a tokio
    /// runtime.
    pub fn spawn(client: FeedClient, period: Duration) -> Result<Self, MetarError> {
        if period.is_zero() {
            return Err(ConfigError::Invalid("refresh period must be greater than 0".into()).into());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MetarError::Runtime(e.to_string()))?;

        let store = Arc::new(StationStore::new());
        let state = Arc::new(Mutex::new(LoopState::Created));
        let cancel = CancellationToken::new();

        let task = runtime.spawn(refresh_loop(
            client,
            Arc::clone(&store),
            Arc::clone(&state),
            cancel.clone(),
            period,
        ));

        Ok(Self {
            store,
            state,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Latest record for a station, as an owned copy.
    pub fn get_airport_data(&self, station_id: &str) -> Option<AirportData> {
        self.store.get(station_id)
    }

    /// Every station id fetched so far.
    pub fn airport_list(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    /// Stop the refresh loop and wait for it to exit.
    ///
    /// A cycle in progress is allowed to finish first. Calling this again
    /// is a no-op.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("METAR refresh task ended abnormally: {}", e);
            }
            *self.state.lock() = LoopState::Stopped;
        }
    }
}

impl Drop for MetarCache {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            tracing::warn!("MetarCache dropped without shutdown, refresh loop keeps running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;

    fn unreachable_client() -> FeedClient {
        let retry = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        };
        // Port 9 (discard) is closed on test machines
        FeedClient::with_retry("http://127.0.0.1:9/metars.csv", Duration::from_millis(200), retry)
            .unwrap()
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = MetarCache::spawn(unreachable_client(), Duration::from_secs(60));
        assert!(matches!(result, Err(MetarError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            max_attempts: 0,
            ..CacheConfig::default()
        };
        let result = MetarCache::new(config);
        assert!(matches!(result, Err(MetarError::Config(_))));
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let result = MetarCache::spawn(unreachable_client(), Duration::ZERO);
        assert!(matches!(result, Err(MetarError::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop_and_is_repeatable() {
        let cache = MetarCache::spawn(unreachable_client(), Duration::from_secs(60)).unwrap();
        assert_ne!(cache.state(), LoopState::Stopped);

        cache.shutdown().await;
        assert_eq!(cache.state(), LoopState::Stopped);

        cache.shutdown().await;
        assert_eq!(cache.state(), LoopState::Stopped);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_cycles_leave_cache_empty() {
        let cache = MetarCache::spawn(unreachable_client(), Duration::from_millis(50)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.state(), LoopState::Running);
        assert!(cache.get_airport_data("EDDF").is_none());
        assert!(cache.airport_list().is_empty());

        cache.shutdown().await;
    }
}
