//! Screen state for the lookup view.

use chrono::{Duration, NaiveDate};
use tracing::debug;

use super::controller::LookupController;
use crate::api::types::Record;
use crate::cache::{total_pages, QueryParams};

/// Lifecycle of the most recent load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
  /// Nothing has been requested yet
  Idle,
  Loading,
  Success,
  /// The last load failed; rows from before are still shown
  Failed,
}

/// Date filter; `None` on either side leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
}

impl DateRange {
  /// Everything up to and including `today`.
  pub fn until(today: NaiveDate) -> Self {
    Self {
      start: None,
      end: Some(today),
    }
  }

  /// The last `days` days ending `today`.
  pub fn last_days(days: u32, today: NaiveDate) -> Self {
    Self {
      start: Some(today - Duration::days(i64::from(days))),
      end: Some(today),
    }
  }
}

/// Filters, pagination and loaded rows of the lookup view.
pub struct LookupView {
  controller: LookupController,
  range: DateRange,
  page: u32,
  page_size: u32,
  rows: Vec<Record>,
  total: u64,
  state: LoadState,
  error: Option<String>,
}

impl LookupView {
  /// Start on page 1 with everything up to `today`.
  pub fn new(controller: LookupController, page_size: u32, today: NaiveDate) -> Self {
    Self {
      controller,
      range: DateRange::until(today),
      page: 1,
      page_size: page_size.max(1),
      rows: Vec::new(),
      total: 0,
      state: LoadState::Idle,
      error: None,
    }
  }

  pub fn state(&self) -> LoadState {
    self.state
  }

  pub fn rows(&self) -> &[Record] {
    &self.rows
  }

  pub fn total(&self) -> u64 {
    self.total
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn range(&self) -> DateRange {
    self.range
  }

  pub fn total_pages(&self) -> u64 {
    total_pages(self.total, self.page_size)
  }

  pub fn controller(&self) -> &LookupController {
    &self.controller
  }

  /// The request the current filters and page describe.
  pub fn params(&self) -> QueryParams {
    QueryParams::new(self.range.start, self.range.end, self.page).with_page_size(self.page_size)
  }

  pub fn set_start_date(&mut self, start: Option<NaiveDate>) {
    self.set_range(DateRange {
      start,
      ..self.range
    });
  }

  pub fn set_end_date(&mut self, end: Option<NaiveDate>) {
    self.set_range(DateRange { end, ..self.range });
  }

  /// Replace the date filter and go back to the first page.
  pub fn set_range(&mut self, range: DateRange) {
    self.range = range;
    self.page = 1;
    self.controller.cancel_prefetch();
  }

  pub fn apply_preset(&mut self, days: u32, today: NaiveDate) {
    self.set_range(DateRange::last_days(days, today));
  }

  /// Drop the start date and reset the end date to `today`.
  pub fn clear_filters(&mut self, today: NaiveDate) {
    self.set_range(DateRange::until(today));
  }

  /// Jump to `page` without checking it against the known total.
  ///
  /// Used before the first load, when the total is not known yet.
  pub fn jump_to(&mut self, page: u32) {
    self.set_page(page.max(1));
  }

  /// Move forward one page. Returns false on the last page.
  pub fn next_page(&mut self) -> bool {
    if u64::from(self.page) >= self.total_pages() {
      return false;
    }
    match self.page.checked_add(1) {
      Some(page) => {
        self.set_page(page);
        true
      }
      None => false,
    }
  }

  /// Move back one page. Returns false on the first page.
  pub fn prev_page(&mut self) -> bool {
    if self.page <= 1 {
      return false;
    }
    self.set_page(self.page - 1);
    true
  }

  fn set_page(&mut self, page: u32) {
    if page != self.page {
      self.page = page;
      self.controller.cancel_prefetch();
    }
  }

  /// Load the rows for the current filters and page.
  ///
  /// On failure the previous rows and total are kept and the error message is
  /// recorded. Nothing is retried.
  pub async fn refresh(&mut self) -> LoadState {
    self.state = LoadState::Loading;
    self.error = None;

    let params = self.params();
    match self.controller.load_page(&params).await {
      Ok(page) => {
        debug!(rows = page.rows.len(), total = page.total, "lookup view loaded");
        self.rows = page.rows;
        self.total = page.total;
        self.state = LoadState::Success;
      }
      Err(e) => {
        self.error = Some(e.to_string());
        self.state = LoadState::Failed;
      }
    }

    self.state
  }
}
