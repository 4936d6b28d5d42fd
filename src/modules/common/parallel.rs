use std::{future::Future, sync::Arc};
use tokio::sync::Semaphore;

use crate::{
    modules::error::{code::ErrorCode, MailFusionResult},
    raise_error,
};

/// Runs `f` over `iter` with at most `concurrency` futures in flight.
///
/// Results keep input order and each item keeps its own outcome, so one failure does not
/// discard the rest of the batch.
pub async fn run_with_limit<I, Item, Fut, F, O>(
    concurrency: usize,
    iter: I,
    f: F,
) -> Vec<MailFusionResult<O>>
where
    I: IntoIterator<Item = Item>,
    Item: Send + 'static,
    Fut: Future<Output = MailFusionResult<O>> + Send + 'static,
    F: Fn(Item) -> Fut + Send + Sync + 'static,
    O: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let f = Arc::new(f);
    let mut handles = Vec::new();

    for item in iter {
        let sem = sem.clone();
        let f = f.clone();
        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await.map_err(|e| {
                raise_error!(
                    format!("Failed to acquire semaphore: {e}"),
                    ErrorCode::InternalError
                )
            })?;
            f(item).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let res = handle.await.unwrap_or_else(|e| {
            Err(raise_error!(
                format!("Task panicked or was cancelled: {e}"),
                ErrorCode::InternalError
            ))
        });
        results.push(res);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_order_and_individual_failures() {
        let results = run_with_limit(2, 1..=5, |n: u32| async move {
            if n == 3 {
                Err(raise_error!("boom".into(), ErrorCode::InternalError))
            } else {
                Ok(n * 10)
            }
        })
        .await;
        assert_eq!(results.len(), 5);
        assert!(results[2].is_err());
        let ok: Vec<u32> = results.into_iter().filter_map(Result::ok).collect();
        assert_eq!(ok, vec![10, 20, 40, 50]);
    }
}
