//! Fixed-size concurrent batching for per-item work.
//!
//! Enrichment and caption calls go out in small waves with a pause
//! between them, keeping pressure on the upstream APIs bounded. Item
//! failures stay per-item; one bad item never sinks its batch.

use std::future::Future;
use std::time::Duration;

/// Runs `worker` over `items` in batches of `batch_size`, awaiting each
/// batch concurrently and sleeping `batch_delay` between batches.
///
/// Results come back in input order. Error handling is the worker's
/// business; a worker that returns `Result` yields a `Vec<Result<_, _>>`
/// the caller can sift.
pub async fn run_batched<T, R, F, Fut>(
    items: Vec<T>,
    batch_size: usize,
    batch_delay: Duration,
    worker: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut results = Vec::with_capacity(items.len());
    let mut remaining = items.into_iter();
    loop {
        let batch: Vec<T> = remaining.by_ref().take(batch_size.max(1)).collect();
        if batch.is_empty() {
            break;
        }
        let outputs = futures::future::join_all(batch.into_iter().map(&worker)).await;
        results.extend(outputs);
        if !remaining.as_slice().is_empty() && !batch_delay.is_zero() {
            tokio::time::sleep(batch_delay).await;
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let results = run_batched(vec![3u64, 1, 2], 2, Duration::ZERO, |n| async move {
            // Later items finish first; order must still hold.
            tokio::time::sleep(Duration::from_millis(n * 5)).await;
            n * 10
        })
        .await;
        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn test_batches_bound_concurrency() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let live_ref = Arc::clone(&live);
        let peak_ref = Arc::clone(&peak);
        run_batched(vec![(); 9], 3, Duration::ZERO, move |()| {
            let live = Arc::clone(&live_ref);
            let peak = Arc::clone(&peak_ref);
            async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                live.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_item_failures_stay_isolated() {
        let results: Vec<Result<u32, String>> =
            run_batched(vec![1u32, 2, 3], 2, Duration::ZERO, |n| async move {
                if n == 2 {
                    Err("bad item".to_string())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(results[0], Ok(1));
        assert!(results[1].is_err());
        assert_eq!(results[2], Ok(3));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u32> = run_batched(Vec::new(), 4, Duration::ZERO, |n: u32| async move { n }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_still_progresses() {
        let results = run_batched(vec![1u32, 2], 0, Duration::ZERO, |n| async move { n }).await;
        assert_eq!(results, vec![1, 2]);
    }
}
