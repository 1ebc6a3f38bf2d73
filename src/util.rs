//! Shared utility functions.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::{Error, Result};

/// Await `fut`, failing with `Error::Timeout` once `limit` elapses.
///
/// With no limit the future is awaited to completion.
pub async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match limit {
        Some(duration) => timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(duration)),
        None => Ok(fut.await),
    }
}
