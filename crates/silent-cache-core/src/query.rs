//! Cache-backed queries (stale-while-revalidate).
//!
//! A [`SilentQuery`] binds a cache key and a [`Fetcher`] to a subscription.
//! Subscribing reads the store synchronously, so a previously cached value is
//! available before any I/O happens, and then revalidates in the background:
//!
//! ```text
//! subscribe ──► ServingCached (value cached, loading = false)
//!          └──► Idle          (nothing cached, loading = true)
//!                  │ enabled
//!                  ▼
//!              Refreshing ──ok──► Refreshed          (store overwritten)
//!                         └─err─► ErroredWithStale   (value kept)
//!                                 ErroredEmpty       (nothing to show)
//! ```
//!
//! Only a key change or `enabled` going from false to true starts a new
//! refresh. Swapping the fetcher or the success callback never does.
//!
//! Refreshes are not cancelled. A refresh that resolves after the query was
//! dropped (or re-keyed) still writes the shared store under the key it was
//! started for, but it no longer touches the query's state.

use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::lifecycle::MountToken;
use crate::store::SilentCache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Values a query can hold: serializable, cloneable into snapshots, and
/// movable across tasks.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Where a query is in its revalidation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Nothing cached and no refresh has settled yet.
    Idle,
    /// Showing a value read from the store.
    ServingCached,
    /// A refresh is in flight.
    Refreshing,
    /// The last refresh succeeded.
    Refreshed,
    /// The last refresh failed; an older value is still shown.
    ErroredWithStale,
    /// The last refresh failed and there is nothing to show.
    ErroredEmpty,
}

/// What a consumer renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
    pub key: String,
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<FetchError>,
    pub status: QueryStatus,
}

impl<T> QuerySnapshot<T> {
    pub fn is_refreshing(&self) -> bool {
        self.status == QueryStatus::Refreshing
    }
}

/// Invoked with the fresh value after a successful refresh.
pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct QueryOptions<T> {
    /// When false, the query only serves what is cached.
    pub enabled: bool,
    pub on_success: Option<SuccessCallback<T>>,
}

impl<T> QueryOptions<T> {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            on_success: None,
        }
    }

    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            on_success: None,
        }
    }
}

struct Binding<T> {
    key: String,
    enabled: bool,
    fetcher: Arc<dyn Fetcher<T>>,
    on_success: Option<SuccessCallback<T>>,
    /// Bumped whenever a refresh starts or the key changes; a settling
    /// refresh only publishes if its generation is still current.
    generation: u64,
}

struct QueryInner<T> {
    state: watch::Sender<QuerySnapshot<T>>,
    binding: Mutex<Binding<T>>,
}

impl<T> QueryInner<T> {
    fn binding(&self) -> MutexGuard<'_, Binding<T>> {
        // Binding updates cannot leave it half-written, so a poisoned lock is still usable
        self.binding.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: CacheValue> QueryInner<T> {
    fn settle(&self, generation: u64, mount: &MountToken, result: Result<T, FetchError>) {
        let binding = self.binding();

        if !mount.is_mounted() {
            debug!("Query for '{}' unmounted, dropping refresh result", binding.key);
            return;
        }
        if binding.generation != generation {
            debug!("Superseded refresh for '{}' ignored", binding.key);
            return;
        }

        match result {
            Ok(value) => {
                let on_success = binding.on_success.clone();
                self.state.send_modify(|s| {
                    s.data = Some(value.clone());
                    s.error = None;
                    s.loading = false;
                    s.status = QueryStatus::Refreshed;
                });
                // The callback may rebind this query
                drop(binding);
                if let Some(callback) = on_success {
                    callback(&value);
                }
            }
            Err(err) => {
                if err.is_transient() {
                    info!(
                        "Refresh for '{}' failed, keeping cached state: {}",
                        binding.key, err
                    );
                } else {
                    warn!("Refresh for '{}' failed: {}", binding.key, err);
                }
                self.state.send_modify(|s| {
                    s.status = if s.data.is_some() {
                        QueryStatus::ErroredWithStale
                    } else {
                        QueryStatus::ErroredEmpty
                    };
                    s.error = Some(err);
                    s.loading = false;
                });
            }
        }
    }
}

/// A subscription to one cache key, revalidated in the background.
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// stops state updates; in-flight refreshes still write the store.
///
/// Creating or re-keying an enabled query spawns onto the current Tokio
/// runtime, so these calls must happen inside one.
pub struct SilentQuery<T: CacheValue> {
    cache: SilentCache,
    inner: Arc<QueryInner<T>>,
    mount: MountToken,
    rx: watch::Receiver<QuerySnapshot<T>>,
}

fn cached_snapshot<T: CacheValue>(cache: &SilentCache, key: &str) -> QuerySnapshot<T> {
    let data: Option<T> = cache.get(key);
    let status = if data.is_some() {
        QueryStatus::ServingCached
    } else {
        QueryStatus::Idle
    };
    QuerySnapshot {
        key: key.to_string(),
        loading: data.is_none(),
        data,
        error: None,
        status,
    }
}

impl<T: CacheValue> SilentQuery<T> {
    /// Subscribe to `key`, serving whatever is cached and revalidating with
    /// `fetcher` if `options.enabled`.
    pub fn subscribe<F>(
        cache: &SilentCache,
        key: impl Into<String>,
        fetcher: F,
        options: QueryOptions<T>,
    ) -> Self
    where
        F: Fetcher<T>,
    {
        let key = key.into();
        let (state, rx) = watch::channel(cached_snapshot(cache, &key));

        let mut query = Self {
            cache: cache.clone(),
            inner: Arc::new(QueryInner {
                state,
                binding: Mutex::new(Binding {
                    key,
                    enabled: options.enabled,
                    fetcher: Arc::new(fetcher),
                    on_success: options.on_success,
                    generation: 0,
                }),
            }),
            mount: MountToken::new(),
            rx,
        };

        if options.enabled {
            query.refresh();
        }
        // `changed()` should report what happens after subscribing
        query.rx.borrow_and_update();
        query
    }

    /// Start a refresh for the current key. The fetcher is invoked right away.
    fn refresh(&self) {
        let (key, fetcher, generation) = {
            let mut binding = self.inner.binding();
            binding.generation += 1;
            (
                binding.key.clone(),
                binding.fetcher.clone(),
                binding.generation,
            )
        };

        self.inner
            .state
            .send_modify(|s| s.status = QueryStatus::Refreshing);
        debug!("Refreshing '{}'", key);

        let pending = fetcher.fetch();
        let cache = self.cache.clone();
        let inner = self.inner.clone();
        let mount = self.mount.clone();

        tokio::spawn(async move {
            let result = pending.await;
            if let Ok(value) = &result {
                cache.set(&key, value);
            }
            inner.settle(generation, &mount, result);
        });
    }

    /// Current state, without waiting.
    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.rx.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<QuerySnapshot<T>> {
        self.inner.state.subscribe()
    }

    /// Wait for the next state change and return the new state.
    pub async fn changed(&mut self) -> QuerySnapshot<T> {
        // The sender lives as long as `self`, so this only fails if it is gone
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }

    /// Wait until no refresh is in flight and return that state.
    pub async fn settled(&mut self) -> QuerySnapshot<T> {
        if let Ok(snapshot) = self.rx.wait_for(|s| !s.is_refreshing()).await {
            return snapshot.clone();
        }
        self.snapshot()
    }

    /// The key currently bound, which follows [`set_key`](Self::set_key).
    pub fn key(&self) -> String {
        self.inner.binding().key.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.binding().enabled
    }

    /// Point the query at another key.
    ///
    /// The new key's cached value (if any) is served immediately and, when
    /// enabled, a refresh starts with the current fetcher. Use
    /// [`set_fetcher`](Self::set_fetcher) first if the fetcher depends on
    /// the key. Setting the same key again does nothing.
    pub fn set_key(&self, key: impl Into<String>) {
        let key = key.into();
        let enabled = {
            let mut binding = self.inner.binding();
            if binding.key == key {
                return;
            }
            binding.key = key.clone();
            binding.generation += 1;
            self.inner.state.send_replace(cached_snapshot(&self.cache, &key));
            binding.enabled
        };

        if enabled {
            self.refresh();
        }
    }

    /// Enable or disable revalidation. Only a false-to-true transition
    /// starts a refresh; disabling does not abandon one already running.
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = {
            let mut binding = self.inner.binding();
            std::mem::replace(&mut binding.enabled, enabled)
        };

        if enabled && !was_enabled {
            self.refresh();
        }
    }

    /// Replace the fetcher used by future refreshes. Never triggers a fetch.
    pub fn set_fetcher<F>(&self, fetcher: F)
    where
        F: Fetcher<T>,
    {
        self.inner.binding().fetcher = Arc::new(fetcher);
    }

    /// Replace the success callback. Never triggers a fetch; a refresh that
    /// is already running reports to the new callback.
    pub fn set_on_success(&self, callback: Option<SuccessCallback<T>>) {
        self.inner.binding().on_success = callback;
    }

    /// Stop receiving updates. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl<T: CacheValue> Drop for SilentQuery<T> {
    fn drop(&mut self) {
        self.mount.unmount();
    }
}

impl SilentCache {
    /// Subscribe an enabled query for `key` with default options.
    pub fn query<T, F>(&self, key: impl Into<String>, fetcher: F) -> SilentQuery<T>
    where
        T: CacheValue,
        F: Fetcher<T>,
    {
        SilentQuery::subscribe(self, key, fetcher, QueryOptions::default())
    }
}
