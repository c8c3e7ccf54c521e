//! Background prefetch task with an explicit cancel handle.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cache::QueryParams;

/// How a prefetch task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchOutcome {
  /// Cancelled before the delay elapsed
  Cancelled,
  /// Something was already stored under the page's key
  AlreadyCached,
  /// Page fetched and written to the cache
  Stored,
  /// Fetch or cache write failed; nothing was retried
  Failed,
}

/// Handle to a scheduled prefetch.
///
/// The job only starts once `delay` has elapsed. Cancelling (or dropping the
/// handle) before then suppresses it; after that the job runs to completion.
#[derive(Debug)]
pub struct PrefetchHandle {
  params: QueryParams,
  cancel: Option<oneshot::Sender<()>>,
  task: JoinHandle<PrefetchOutcome>,
}

impl PrefetchHandle {
  /// Spawn `job` on the runtime after `delay`.
  pub fn spawn<F, Fut>(params: QueryParams, delay: Duration, job: F) -> Self
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = PrefetchOutcome> + Send + 'static,
  {
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
      tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        // Fires on an explicit cancel and when the sender is dropped
        _ = cancel_rx => return PrefetchOutcome::Cancelled,
      }
      job().await
    });

    Self {
      params,
      cancel: Some(cancel_tx),
      task,
    }
  }

  /// The page this prefetch targets.
  pub fn params(&self) -> &QueryParams {
    &self.params
  }

  /// Cancel the prefetch if it has not started yet.
  pub fn cancel(&mut self) {
    if let Some(tx) = self.cancel.take() {
      let _ = tx.send(());
    }
  }

  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }

  /// Wait for the task to end.
  pub async fn join(self) -> PrefetchOutcome {
    let PrefetchHandle { cancel, task, .. } = self;
    // Keep the sender alive so waiting doesn't count as cancelling
    let _cancel = cancel;

    match task.await {
      Ok(outcome) => outcome,
      Err(e) if e.is_cancelled() => PrefetchOutcome::Cancelled,
      Err(_) => PrefetchOutcome::Failed,
    }
  }
}
