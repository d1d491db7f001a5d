mod atomic_write;
pub mod fetch;

pub use atomic_write::atomic_write;
pub use fetch::{FetchError, Fetcher, RetryConfig};
