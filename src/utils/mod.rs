//! Shared plumbing: HTTP client, caching, and retry logic.

mod cache;
mod http;
mod retry;

pub use cache::{CacheResult, CacheStats, MemoryCache};
pub use http::HttpClient;
pub use retry::{with_retry, RetryConfig};
