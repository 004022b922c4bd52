use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// 以受限并发度在tokio任务上执行一组future，结果顺序与输入一致。
/// 单个任务panic时对应位置为 `Err(JoinError)`，不影响其他任务。
pub async fn do_parallel_with_limit<F, T>(
    futures: Vec<F>,
    max_concurrent: usize,
) -> Vec<Result<T, JoinError>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let handles = futures.into_iter().map(|fut| {
        let semaphore = semaphore.clone();
        tokio::spawn(async move {
            // 信号量从不关闭，获取失败时直接执行
            let _permit = semaphore.acquire_owned().await.ok();
            fut.await
        })
    });

    join_all(handles.collect::<Vec<_>>()).await
}
