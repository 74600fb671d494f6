//! Ready-made probes for things a supervised process causes
//!
//! Each probe performs one check. Combine them with [`retry_until`] to wait:
//!
//! ```no_run
//! use buildrig_poll::{conditions, retry_until, RetryPolicy};
//! use std::path::Path;
//!
//! # async fn wait() -> Result<(), Box<dyn std::error::Error>> {
//! let log = Path::new("target/server.log");
//! retry_until(&RetryPolicy::fixed_ms(400), || conditions::file_exists(log)).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use reqwest::Client;
use tokio::net::TcpStream;

use crate::error::ConditionError;
use crate::policy::RetryPolicy;
use crate::retry::retry_until;
use crate::RetryError;

/// The path exists
pub async fn file_exists(path: &Path) -> Result<(), ConditionError> {
    if tokio::fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(ConditionError::Missing(path.to_path_buf()))
    }
}

/// The URL answers at all (any status)
pub async fn http_ok(client: &Client, url: &str) -> Result<reqwest::Response, ConditionError> {
    Ok(client.get(url).send().await?)
}

/// The URL answers with `expected` status
pub async fn http_status(client: &Client, url: &str, expected: u16) -> Result<(), ConditionError> {
    let actual = client.get(url).send().await?.status().as_u16();
    if actual == expected {
        Ok(())
    } else {
        Err(ConditionError::Status {
            url: url.to_string(),
            expected,
            actual,
        })
    }
}

/// The URL answers with exactly `expected` as body
pub async fn http_body_equals(client: &Client, url: &str, expected: &str) -> Result<(), ConditionError> {
    let actual = client.get(url).send().await?.text().await?;
    if actual == expected {
        Ok(())
    } else {
        Err(ConditionError::Body {
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// The URL no longer answers
pub async fn http_down(client: &Client, url: &str) -> Result<(), ConditionError> {
    match client.get(url).send().await {
        Ok(_) => Err(ConditionError::StillUp(url.to_string())),
        Err(_) => Ok(()),
    }
}

/// Nothing accepts TCP connections on `addr`
pub async fn port_closed(addr: &str) -> Result<(), ConditionError> {
    match TcpStream::connect(addr).await {
        Ok(_) => Err(ConditionError::PortOpen(addr.to_string())),
        Err(_) => Ok(()),
    }
}

/// Wait for the server at `url` to go down and come back up
pub async fn restarted(
    client: &Client,
    url: &str,
    down: &RetryPolicy,
    up: &RetryPolicy,
) -> Result<(), RetryError<ConditionError>> {
    retry_until(down, || http_down(client, url)).await?;
    retry_until(up, || http_ok(client, url)).await?;
    Ok(())
}
