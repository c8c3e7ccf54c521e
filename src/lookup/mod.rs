//! The lookup view: cached, paginated queries over a date range.
//!
//! `LookupController` drives each request through the cache and only hits the
//! network on a miss. After every successful load it schedules a delayed
//! prefetch of the next page. `LookupView` holds the state a screen would show
//! (filters, page, rows, load state) on top of the controller.

mod controller;
mod prefetch;
mod view;

use async_trait::async_trait;

use crate::api::types::ResultPage;
use crate::api::FetchError;
use crate::cache::QueryParams;

pub use controller::LookupController;
pub use view::{LoadState, LookupView};

/// Where lookup pages come from when the cache can't answer.
#[async_trait]
pub trait LookupSource: Send + Sync {
  async fn fetch_page(&self, params: &QueryParams) -> Result<ResultPage, FetchError>;
}
