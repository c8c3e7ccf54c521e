use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prefetch::{PrefetchHandle, PrefetchOutcome};
use super::LookupSource;
use crate::api::types::ResultPage;
use crate::api::FetchError;
use crate::cache::{build_key, policy, total_pages, CacheKey, CacheStore, Lookup, QueryParams};

/// Source of "now" for expiry checks and entry timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Default delay between a finished load and the next-page prefetch.
pub const DEFAULT_PREFETCH_DELAY: Duration = Duration::from_millis(1500);

/// Serves lookup pages from the cache, falling back to the network.
///
/// Cheap to clone; clones share the store, the source and the pending prefetch.
#[derive(Clone)]
pub struct LookupController {
  store: Arc<dyn CacheStore>,
  source: Arc<dyn LookupSource>,
  clock: Clock,
  prefetch_delay: Duration,
  /// At most one prefetch is pending at a time
  prefetch: Arc<Mutex<Option<PrefetchHandle>>>,
}

impl LookupController {
  pub fn new(store: Arc<dyn CacheStore>, source: Arc<dyn LookupSource>) -> Self {
    Self {
      store,
      source,
      clock: Arc::new(Utc::now),
      prefetch_delay: DEFAULT_PREFETCH_DELAY,
      prefetch: Arc::new(Mutex::new(None)),
    }
  }

  pub fn with_prefetch_delay(mut self, delay: Duration) -> Self {
    self.prefetch_delay = delay;
    self
  }

  /// Replace the wall clock, e.g. to test expiry.
  #[cfg(test)]
  pub fn with_clock<F>(mut self, clock: F) -> Self
  where
    F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
  {
    self.clock = Arc::new(clock);
    self
  }

  /// Load one page, from the cache when a valid entry exists.
  ///
  /// A miss costs exactly one fetch, whose result is written back to the
  /// cache. Failing to write the cache is logged and otherwise ignored. Any
  /// successful load schedules a prefetch of the following page.
  pub async fn load_page(&self, params: &QueryParams) -> Result<ResultPage, FetchError> {
    // Whatever was pending belongs to the previous request
    self.cancel_prefetch();

    let key = build_key(params);
    let page = match policy::lookup(self.store.as_ref(), &key, (self.clock)()) {
      Lookup::Hit(page) => {
        info!(params = %params.describe(), "lookup served from cache");
        page
      }
      Lookup::Miss(reason) => {
        debug!(params = %params.describe(), ?reason, "lookup cache miss, fetching");
        let page = self.source.fetch_page(params).await?;
        self.write_through(&key, &page);
        page
      }
    };

    self.schedule_prefetch(params, page.total);
    Ok(page)
  }

  fn write_through(&self, key: &CacheKey, page: &ResultPage) {
    if let Err(e) = policy::store(self.store.as_ref(), key, page, (self.clock)()) {
      warn!(key = %key, error = %e, "failed to cache lookup page");
    }
  }

  /// Schedule the next page unless `params` is already the last one.
  fn schedule_prefetch(&self, params: &QueryParams, total: u64) {
    if u64::from(params.page) >= total_pages(total, params.page_size) {
      return;
    }
    // The server reports `total`, so the page count can outrun u32
    let Some(next_page) = params.page.checked_add(1) else {
      return;
    };

    let next = params.with_page(next_page);
    let store = Arc::clone(&self.store);
    let source = Arc::clone(&self.source);
    let clock = Arc::clone(&self.clock);

    debug!(page = next.page, delay_ms = self.prefetch_delay.as_millis() as u64, "scheduling prefetch");
    let handle = PrefetchHandle::spawn(next, self.prefetch_delay, move || {
      prefetch_page(store, source, clock, next)
    });

    if let Some(mut previous) = self.slot().replace(handle) {
      previous.cancel();
    }
  }

  /// Cancel the pending prefetch, if it has not started yet.
  pub fn cancel_prefetch(&self) {
    if let Some(mut handle) = self.slot().take() {
      if !handle.is_finished() {
        debug!(page = handle.params().page, "cancelling prefetch");
      }
      handle.cancel();
    }
  }

  /// Params of the prefetch currently scheduled or running.
  #[cfg(test)]
  pub fn pending_prefetch(&self) -> Option<QueryParams> {
    self.slot().as_ref().map(|h| *h.params())
  }

  /// Wait for the current prefetch to end. `None` if nothing was scheduled.
  pub async fn wait_for_prefetch(&self) -> Option<PrefetchOutcome> {
    let handle = self.slot().take()?;
    Some(handle.join().await)
  }

  fn slot(&self) -> MutexGuard<'_, Option<PrefetchHandle>> {
    // A panic while holding the lock can't leave the slot half-written
    self.prefetch.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Fetch and cache `params` unless its key is already present.
///
/// Presence is enough to skip: an expired neighbour is not refetched here.
async fn prefetch_page(
  store: Arc<dyn CacheStore>,
  source: Arc<dyn LookupSource>,
  clock: Clock,
  params: QueryParams,
) -> PrefetchOutcome {
  let key = build_key(&params);
  if policy::contains(store.as_ref(), &key) {
    debug!(page = params.page, "prefetch skipped, page already cached");
    return PrefetchOutcome::AlreadyCached;
  }

  info!(page = params.page, "prefetching lookup page");
  let page = match source.fetch_page(&params).await {
    Ok(page) => page,
    Err(e) => {
      warn!(page = params.page, error = %e, "prefetch failed");
      return PrefetchOutcome::Failed;
    }
  };

  match policy::store(store.as_ref(), &key, &page, clock()) {
    Ok(()) => PrefetchOutcome::Stored,
    Err(e) => {
      warn!(page = params.page, error = %e, "failed to cache prefetched page");
      PrefetchOutcome::Failed
    }
  }
}
