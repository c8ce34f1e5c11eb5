use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::core::collector::Collector;

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    match total_secs < 60 {
        true => format!("{}s", total_secs),
        false => format!("{}m{}s", total_secs / 60, total_secs % 60),
    }
}

fn format_latency(latency: Duration) -> String {
    format!("{:.2}ms", latency.as_secs_f64() * 1000.0)
}

// 实时监控任务
// 每个tick取一次快照, 输出区间内的rps、平均延迟、p99和错误率
// 快照的副作用顺带推进时间序列
pub(crate) async fn realtime_monitor(
    collector: Arc<Collector>,
    monitor_interval: Duration,
    test_start: Instant,
    cancel: CancellationToken,
) {
    let tick_period = match monitor_interval.is_zero() {
        true => Duration::from_secs(1),
        false => monitor_interval,
    };
    let mut ticker = interval(tick_period);
    // 第一个tick立即完成, 跳过它
    ticker.tick().await;

    let mut last_snapshot = collector.snapshot();
    let mut last_time = Instant::now();

    println!("\n⏱  实时监控已启动");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<10} {:<10} {:<15} {:<15} {:<10}",
        "时间", "RPS", "平均延迟", "P99延迟", "错误率"
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let current_snapshot = collector.snapshot();
                let current_time = Instant::now();

                // 区间增量
                let elapsed = current_time.duration_since(last_time).as_secs_f64();
                let requests_delta = current_snapshot
                    .total_requests
                    .saturating_sub(last_snapshot.total_requests);
                let errors_delta = current_snapshot
                    .total_errors
                    .saturating_sub(last_snapshot.total_errors);

                let rps = match elapsed > 0.0 {
                    true => requests_delta as f64 / elapsed,
                    false => 0.0,
                };
                let error_rate = match requests_delta > 0 {
                    true => errors_delta as f64 / requests_delta as f64 * 100.0,
                    false => 0.0,
                };

                println!(
                    "{:<10} {:<10.2} {:<15} {:<15} {:<9.2}%",
                    format_elapsed(test_start.elapsed()),
                    rps,
                    format_latency(current_snapshot.avg_latency),
                    format_latency(current_snapshot.p99_latency),
                    error_rate,
                );

                last_snapshot = current_snapshot;
                last_time = current_time;
            }
        }
    }
}
