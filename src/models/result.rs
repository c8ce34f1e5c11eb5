use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// 延迟统计, 全部来源于直方图
#[derive(Debug, Clone, Serialize, Default)]
pub struct LatencyStats {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub stddev: Duration,
    pub p50: Duration,
    pub p75: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub p999: Duration,
}

// 时间序列点, 间隔不小于1秒
#[derive(Debug, Clone, Serialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    // 自上个点以来的rps
    pub rps: f64,
    pub avg_latency: Duration,
    pub error_rate: f64,
}

// 最终测试结果
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    // 总请求数
    pub total_requests: u64,
    // 成功请求
    pub success_requests: u64,
    // 失败请求
    pub failed_requests: u64,
    // 运行时间
    pub duration: Duration,
    // 吞吐量(请求/秒)
    pub throughput: f64,
    // 总接收字节
    pub bytes_received: u64,
    // 总发送字节
    pub bytes_sent: u64,
    // 延迟统计
    pub latency: LatencyStats,
    // 被钳位到直方图边界的延迟样本数
    pub latency_clamped: u64,
    // 按类型统计的错误
    pub errors_by_type: HashMap<String, u64>,
    // 按状态码统计
    pub status_codes: HashMap<u16, u64>,
    // 时间序列数据
    pub time_series: Vec<TimePoint>,
}

impl BenchResult {
    pub fn success_rate(&self) -> f64 {
        match self.total_requests > 0 {
            true => self.success_requests as f64 / self.total_requests as f64 * 100.0,
            false => 0.0,
        }
    }

    pub fn error_rate(&self) -> f64 {
        match self.total_requests > 0 {
            true => self.failed_requests as f64 / self.total_requests as f64 * 100.0,
            false => 0.0,
        }
    }

    pub fn receive_rate(&self) -> f64 {
        match self.duration.as_secs_f64() > 0.0 {
            true => self.bytes_received as f64 / self.duration.as_secs_f64(),
            false => 0.0,
        }
    }

    pub fn send_rate(&self) -> f64 {
        match self.duration.as_secs_f64() > 0.0 {
            true => self.bytes_sent as f64 / self.duration.as_secs_f64(),
            false => 0.0,
        }
    }
}
