use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

// 速率限制器, 严格按照1s/rps的周期放行
// 错过的tick顺延而不是补发, 不允许突发
pub struct RateLimiter {
    interval: Interval,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / rps as f64);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        RateLimiter { interval }
    }

    // 等待下一个放行时刻, 取消时返回false
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.interval.tick() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_rate_limiter_paces_admissions() {
        let rps = 100;
        let mut limiter = RateLimiter::new(rps);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..50 {
            assert!(limiter.wait(&cancel).await);
        }
        let elapsed = start.elapsed();
        // 首个tick立即放行, 其余49个各间隔10ms
        assert!(
            elapsed >= Duration::from_millis(440) && elapsed <= Duration::from_millis(700),
            "速率限制不准确: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_rate_limiter_cancel() {
        let mut limiter = RateLimiter::new(1);
        let cancel = CancellationToken::new();
        assert!(limiter.wait(&cancel).await);
        cancel.cancel();
        assert!(!limiter.wait(&cancel).await);
    }
}
