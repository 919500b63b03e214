//! Retry and backoff policy.
//!
//! Classifies transport failures (timeouts, connection drops, rejected
//! credentials) and computes exponential backoff so the telemetry loop and the
//! fetcher share one notion of "is this the link going away".

mod classify;
mod policy;

pub use classify::{classify_curl_error, classify_mqtt_error};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
