use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::executor::RequestExecutor;

// worker协程: 等待放行令牌或取消信号
// 取到令牌就执行一次请求, 通道关闭且取空后干净退出
// 取消只在循环顶部生效, 进行中的请求总是允许完成
pub(crate) async fn run_worker(
    worker_id: usize,
    executor: Arc<RequestExecutor>,
    token_rx: async_channel::Receiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            token = token_rx.recv() => {
                match token {
                    Ok(()) => executor.execute(worker_id).await,
                    Err(_) => break,
                }
            }
        }
    }
}
