//! Typed client for the job board API.
//!
//! Every request goes through a small governor: a concurrency cap, in-flight
//! GET deduplication, per-endpoint cooldowns and 429 retry with jittered
//! exponential backoff.

mod client;
pub mod error;
pub mod governor;
pub mod types;

pub use client::ApiClient;
pub use error::ClientError;
pub use governor::GovernorConfig;
