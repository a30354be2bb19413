use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::error::EngineError;

/// Execute one batch of ready tasks concurrently.
///
/// # Arguments
///
/// * `items` - `(task_id, input)` pairs for this batch, in definition order
/// * `max_concurrency` - Maximum number of tasks running at once
/// * `executor_fn` - Async function executing a single task
///
/// # Returns
///
/// `(task_id, result)` pairs in the same order as `items`, regardless of the
/// order in which tasks finished.
pub async fn execute_batch<I, R, F, Fut>(
    items: Vec<(String, I)>,
    max_concurrency: usize,
    executor_fn: F,
) -> Result<Vec<(String, R)>, EngineError>
where
    F: Fn(String, I) -> Fut,
    Fut: Future<Output = R>,
{
    let order: Vec<String> = items.iter().map(|(id, _)| id.clone()).collect();
    let sem = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut futs = FuturesUnordered::new();

    for (task_id, input) in items {
        let sem = sem.clone();
        let fut = executor_fn(task_id.clone(), input);

        futs.push(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|_| EngineError::Runner("semaphore closed unexpectedly".into()))?;

            Ok::<_, EngineError>((task_id, fut.await))
        });
    }

    let mut results: HashMap<String, R> = HashMap::with_capacity(order.len());
    while let Some(res) = futs.next().await {
        let (task_id, result) = res?;
        results.insert(task_id, result);
    }

    Ok(order
        .into_iter()
        .filter_map(|id| results.remove(&id).map(|r| (id, r)))
        .collect())
}
