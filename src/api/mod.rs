//! HTTP transport to the recognition service.
//!
//! Used by the reference engine for database sync and online search.

mod client;
mod retry;

pub use client::{ApiClient, SearchRequest, API_KEY_ENV, DEFAULT_API_URL};
pub use retry::{
    is_transient_network_error, RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX,
    DEFAULT_NETWORK_RETRIES,
};
