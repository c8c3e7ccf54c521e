pub mod api_types;
pub mod client;
pub mod types;

pub use client::{ApiClient, FetchError, RecordView};
