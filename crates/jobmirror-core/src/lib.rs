pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod query;
pub mod remote;
pub mod retry;
pub mod storage;
pub mod telemetry;

pub use error::{MirrorError, Result};
