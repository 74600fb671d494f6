//! # buildrig-poll
//!
//! Wait for conditions a supervised process causes (a log file appearing, a
//! server answering, a port closing) without tight-looping.
//!
//! [`retry`] runs one independent poll loop per call: there is no shared
//! state, so any number of polls may run concurrently.

pub mod conditions;
pub mod error;
pub mod policy;
pub mod retry;

pub use error::{ConditionError, RetryError};
pub use policy::{Backoff, RetryPolicy};
pub use retry::{retry, retry_until, Failure};
pub use tokio_util::sync::CancellationToken;
