use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

// 渐进式负载的激活门
// worker池按end数量预先启动, 全部挂在信号量后面等待激活,
// 许可只增不减, 激活后的worker不会中途停用
pub struct ConcurrencyController {
    semaphore: Arc<Semaphore>,
    start: usize,
    end: usize,
    step_interval: Duration,
    steps: usize,
}

impl ConcurrencyController {
    pub fn new(start: usize, end: usize, duration: Duration, steps: usize) -> Self {
        let steps = steps.max(1);
        ConcurrencyController {
            semaphore: Arc::new(Semaphore::new(0)),
            start: start.min(end),
            end,
            step_interval: duration / steps as u32,
            steps,
        }
    }

    // 分发激活许可
    // t=0放行start个, 之后每个步进间隔放行(end-start)/steps个,
    // 整数余数并入最后一步, 结束时激活数恰好等于end
    pub async fn distribute_permits(&self, cancel: &CancellationToken) {
        self.semaphore.add_permits(self.start);
        let mut activated = self.start;
        let step = (self.end - self.start) / self.steps;
        for i in 0..self.steps {
            if activated >= self.end {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.step_interval) => {}
            }
            let target = match i == self.steps - 1 {
                true => self.end,
                false => (activated + step).min(self.end),
            };
            if target > activated {
                self.semaphore.add_permits(target - activated);
                activated = target;
            }
        }
    }

    pub fn semaphore(&self) -> Arc<Semaphore> {
        self.semaphore.clone()
    }
}
