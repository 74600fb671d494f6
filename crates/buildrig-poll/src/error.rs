//! Error types for polling

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a poll loop gave up
///
/// Every variant keeps the operation's own failure so the root cause reaches
/// the caller instead of a bare "timed out".
#[derive(Debug)]
pub enum RetryError<E> {
    /// `max_attempts` reached
    Exhausted { attempts: u32, last: E },
    /// `timeout` elapsed; `last` is `None` if the first attempt was cut short
    TimedOut { attempts: u32, last: Option<E> },
    /// The cancellation token fired
    Cancelled { attempts: u32, last: Option<E> },
    /// The operation reported the condition can never be met
    Aborted { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    /// Attempts started before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::TimedOut { attempts, .. }
            | RetryError::Cancelled { attempts, .. }
            | RetryError::Aborted { attempts, .. } => *attempts,
        }
    }

    /// The most recent operation failure, if any attempt finished
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Aborted { source: last, .. } => Some(last),
            RetryError::TimedOut { last, .. } | RetryError::Cancelled { last, .. } => last.as_ref(),
        }
    }

    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Aborted { source: last, .. } => Some(last),
            RetryError::TimedOut { last, .. } | RetryError::Cancelled { last, .. } => last,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryError::TimedOut { attempts, last } => {
                write!(f, "timed out after {} attempts", attempts)?;
                match last {
                    Some(last) => write!(f, ": {}", last),
                    None => Ok(()),
                }
            }
            RetryError::Cancelled { attempts, last } => {
                write!(f, "cancelled after {} attempts", attempts)?;
                match last {
                    Some(last) => write!(f, ": {}", last),
                    None => Ok(()),
                }
            }
            RetryError::Aborted { attempts, source } => {
                write!(f, "condition cannot be met (attempt {}): {}", attempts, source)
            }
        }
    }
}

impl<E> StdError for RetryError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.last_error().map(|e| e as &(dyn StdError + 'static))
    }
}

/// Failures of the built-in condition probes
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("{0} does not exist yet")]
    Missing(PathBuf),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {actual}, expected {expected}")]
    Status { url: String, expected: u16, actual: u16 },

    #[error("{url} answered {actual:?}, expected {expected:?}")]
    Body {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("{0} is still answering")]
    StillUp(String),

    #[error("{0} is still accepting connections")]
    PortOpen(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
