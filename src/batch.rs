//! Run a batch of futures together and collect every outcome
//!
//! Failures are collected next to successes rather than short-circuiting the
//! batch. Only the global timeout aborts the whole batch.

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use std::future::Future;
use std::time::Duration;

use crate::common::progress::count_bar;
use crate::common::{Result, UtilError};

/// Progress bar label used when none is given
pub const DEFAULT_DESCRIPTION: &str = "Running tasks";

/// Options for [`wait_all`] and [`wait_for_complete`]
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Draw a progress bar on stderr
    pub progress: bool,
    /// Drop failed outcomes from the result
    pub ignore_errors: bool,
    /// Give up on the whole batch after this long
    pub timeout: Option<Duration>,
    /// Return outcomes in completion order instead of input order
    pub fast_first: bool,
    pub description: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            progress: false,
            ignore_errors: false,
            timeout: None,
            fast_first: false,
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

/// Await every future concurrently
///
/// # Errors
///
/// Only [`UtilError::Timeout`], when `timeout` elapses first. Unfinished
/// futures are dropped.
pub async fn wait_all<I, F, T, E>(
    futures: I,
    opts: &BatchOptions,
) -> Result<Vec<std::result::Result<T, E>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = std::result::Result<T, E>>,
{
    let mut pending: FuturesUnordered<_> = futures
        .into_iter()
        .enumerate()
        .map(|(idx, fut)| async move { (idx, fut.await) })
        .collect();
    let total = pending.len();
    debug!("Waiting for {} tasks", total);

    let bar = count_bar(total as u64, &opts.description, opts.progress);
    let collect = async {
        let mut finished = Vec::with_capacity(total);
        while let Some(outcome) = pending.next().await {
            bar.inc(1);
            finished.push(outcome);
        }
        finished
    };

    let mut finished = match opts.timeout {
        Some(limit) => tokio::time::timeout(limit, collect).await.map_err(|_| {
            bar.abandon();
            UtilError::Timeout(format!("{} tasks did not complete within {:?}", total, limit))
        })?,
        None => collect.await,
    };
    bar.finish_and_clear();

    if !opts.fast_first {
        finished.sort_by_key(|(idx, _)| *idx);
    }
    Ok(finished
        .into_iter()
        .map(|(_, outcome)| outcome)
        .filter(|outcome| !(opts.ignore_errors && outcome.is_err()))
        .collect())
}

/// Blocking [`wait_all`] on a private runtime
///
/// Must not be called from inside an async runtime.
pub fn wait_for_complete<I, F, T, E>(
    futures: I,
    opts: &BatchOptions,
) -> Result<Vec<std::result::Result<T, E>>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = std::result::Result<T, E>>,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(UtilError::InvalidInput(
            "wait_for_complete called inside an async runtime, use wait_all".to_string(),
        ));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(wait_all(futures, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use tokio::time::sleep;

    fn delayed(ms: u64, value: i32) -> BoxFuture<'static, std::result::Result<i32, String>> {
        async move {
            sleep(Duration::from_millis(ms)).await;
            if value < 0 {
                Err(format!("failed {}", value))
            } else {
                Ok(value)
            }
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_input_order() {
        let futures = vec![delayed(60, 1), delayed(10, 2), delayed(30, 3)];
        let results = wait_all(futures, &BatchOptions::default()).await.unwrap();
        assert_eq!(results, vec![Ok(1), Ok(2), Ok(3)]);
    }

    #[tokio::test]
    async fn test_fast_first() {
        let opts = BatchOptions {
            fast_first: true,
            ..Default::default()
        };
        let futures = vec![delayed(80, 1), delayed(5, 2), delayed(40, 3)];
        let results = wait_all(futures, &opts).await.unwrap();
        assert_eq!(results, vec![Ok(2), Ok(3), Ok(1)]);
    }

    #[tokio::test]
    async fn test_errors_collected_or_ignored() {
        let futures = vec![delayed(1, 1), delayed(1, -1), delayed(1, 3)];
        let results = wait_all(futures, &BatchOptions::default()).await.unwrap();
        assert_eq!(results, vec![Ok(1), Err("failed -1".to_string()), Ok(3)]);

        let opts = BatchOptions {
            ignore_errors: true,
            ..Default::default()
        };
        let futures = vec![delayed(1, 1), delayed(1, -1), delayed(1, 3)];
        let results = wait_all(futures, &opts).await.unwrap();
        assert_eq!(results, vec![Ok(1), Ok(3)]);
    }

    #[tokio::test]
    async fn test_timeout() {
        let opts = BatchOptions {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let err = wait_all(vec![delayed(1, 1), delayed(2_000, 2)], &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, UtilError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let futures: Vec<BoxFuture<'static, std::result::Result<i32, String>>> = Vec::new();
        assert!(wait_all(futures, &BatchOptions::default()).await.unwrap().is_empty());
    }

    #[test]
    fn test_wait_for_complete_blocking() {
        let opts = BatchOptions {
            progress: true,
            ..Default::default()
        };
        let results = wait_for_complete(vec![delayed(5, 7), delayed(1, 8)], &opts).unwrap();
        assert_eq!(results, vec![Ok(7), Ok(8)]);
    }

    #[tokio::test]
    async fn test_wait_for_complete_inside_runtime() {
        assert!(wait_for_complete(vec![delayed(1, 1)], &BatchOptions::default()).is_err());
    }
}
