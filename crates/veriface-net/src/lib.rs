//! veriface-net: Image acquisition over HTTP.
//!
//! Downloads image bytes with a per-attempt timeout and a fixed-delay retry
//! policy. Individual attempt failures stay internal; callers only see the
//! final outcome.

pub mod error;
pub mod fetcher;

pub use error::{AttemptError, FetchError};
pub use fetcher::{FetchPolicy, ImageFetcher};
