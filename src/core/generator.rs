use tokio_util::sync::CancellationToken;

use crate::core::rate_limiter::RateLimiter;

// 令牌生成器: 按速率限制向worker通道投放放行令牌
// total_requests大于0时投满即止, 否则持续投放直到取消
// 退出时关闭通道, worker取空后自行退出
pub(crate) async fn generate_requests(
    token_tx: async_channel::Sender<()>,
    mut rate_limiter: Option<RateLimiter>,
    total_requests: u64,
    cancel: CancellationToken,
) {
    let mut produced: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if total_requests > 0 && produced >= total_requests {
            break;
        }
        if let Some(limiter) = rate_limiter.as_mut() {
            if !limiter.wait(&cancel).await {
                break;
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = token_tx.send(()) => {
                match sent {
                    Ok(()) => produced += 1,
                    Err(_) => break,
                }
            }
        }
    }
    token_tx.close();
}
