use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::{ApiFilterRequest, ApiHealth, ApiLookupResponse};
use super::types::{Record, ResultPage};
use crate::cache::QueryParams;
use crate::config::Config;
use crate::lookup::LookupSource;

/// Failure of a request to the records API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// The request never produced a response (connection refused, timeout, ...)
  #[error("{0}")]
  Transport(String),
  /// The server answered with a non-success status
  #[error("{message} ({status})")]
  Status { status: u16, message: String },
  /// The response body did not have the expected shape
  #[error("Invalid response: {0}")]
  Decode(String),
}

/// The record views served by the API besides the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordView {
  Assessments,
  Responses,
  Pending,
}

impl RecordView {
  /// Endpoint returning the unfiltered view, if the view has one.
  fn list_path(self) -> Option<&'static str> {
    match self {
      RecordView::Assessments => Some("assessments"),
      RecordView::Responses => Some("responses"),
      RecordView::Pending => None,
    }
  }

  fn filter_path(self) -> &'static str {
    match self {
      RecordView::Assessments => "filter-assessments",
      RecordView::Responses => "filter-responses",
      RecordView::Pending => "pending",
    }
  }
}

/// HTTP client for the records API.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: String,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = config.api_base();
    Url::parse(&base).map_err(|e| eyre!("Invalid API base URL '{}': {}", base, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    debug!(base = %base, "API client configured");
    Ok(Self { http, base })
  }

  /// Base URL requests are sent to, without a trailing slash
  pub fn base(&self) -> &str {
    &self.base
  }

  fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
    let url = format!("{}/{}", self.base, path);
    Url::parse(&url).map_err(|e| FetchError::Transport(format!("Invalid URL {}: {}", url, e)))
  }

  async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, FetchError> {
    let response = request
      .send()
      .await
      .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        status: status.as_u16(),
        message: format!("Request failed with status code {}", status.as_u16()),
      });
    }

    response
      .json::<T>()
      .await
      .map_err(|e| FetchError::Decode(e.to_string()))
  }

  /// Fetch one page of the lookup view.
  pub async fn lookup(&self, params: &QueryParams) -> Result<ResultPage, FetchError> {
    let url = self.endpoint("nikeeta-lookup")?;
    debug!(params = %params.describe(), "fetching lookup page");

    let response: ApiLookupResponse = self.send(self.http.post(url).json(params)).await?;
    Ok(response.into())
  }

  /// Fetch a record view, filtered server-side when `filters` is non-empty.
  pub async fn records(
    &self,
    view: RecordView,
    filters: &ApiFilterRequest,
  ) -> Result<Vec<Record>, FetchError> {
    let request = match view.list_path() {
      Some(path) if filters.filters.is_empty() => self.http.get(self.endpoint(path)?),
      _ => self.http.post(self.endpoint(view.filter_path())?).json(filters),
    };

    let rows: Option<Vec<Record>> = self.send(request).await?;
    Ok(rows.unwrap_or_default())
  }

  /// Check whether the API is up.
  pub async fn health(&self) -> Result<bool, FetchError> {
    let url = self.endpoint("health")?;
    let health: ApiHealth = self.send(self.http.get(url)).await?;
    Ok(health.ok)
  }
}

#[async_trait]
impl LookupSource for ApiClient {
  async fn fetch_page(&self, params: &QueryParams) -> Result<ResultPage, FetchError> {
    self.lookup(params).await
  }
}
