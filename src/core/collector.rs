use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::core::fixed_size_queue::FixedSizeQueue;
use crate::core::histogram::LatencyHistogram;
use crate::models::result::{LatencyStats, TimePoint};

// 错误类型的封闭词表
pub const ERROR_REQUEST_CREATION: &str = "request_creation";
pub const ERROR_NETWORK: &str = "network";
pub const ERROR_BODY_READ: &str = "body_read";
pub const ERROR_VALIDATION: &str = "validation";
pub const ERROR_TIMEOUT: &str = "timeout";

// 时间序列最多保留1小时的点
const TIME_SERIES_CAPACITY: usize = 3600;

// 快照数据, 值拷贝, 可以安全地跨任务传递
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub total_requests: u64,
    pub success_requests: u64,
    pub total_errors: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub latency: LatencyStats,
    pub latency_clamped: u64,
    pub avg_latency: Duration,
    pub p99_latency: Duration,
    pub errors_by_type: HashMap<String, u64>,
    pub status_codes: HashMap<u16, u64>,
    pub timestamp: DateTime<Utc>,
}

// 上一个时间序列点的状态, 用于计算区间增量
struct LastPoint {
    at: Instant,
    total_requests: u64,
}

// 统计收集器
// 计数器全部使用原子量, 直方图单独加锁, 错误与状态码表用读写锁包裹、
// 表内计数器仍为原子量, 已存在的key更新时不竞争写锁
pub struct Collector {
    total_requests: AtomicU64,
    success_requests: AtomicU64,
    total_errors: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,

    histogram: Mutex<LatencyHistogram>,

    errors_by_type: RwLock<HashMap<String, Arc<AtomicU64>>>,
    status_codes: RwLock<HashMap<u16, Arc<AtomicU64>>>,

    time_series: Mutex<FixedSizeQueue<TimePoint>>,
    last_point: Mutex<LastPoint>,
}

impl Collector {
    pub fn new() -> Self {
        Collector {
            total_requests: AtomicU64::new(0),
            success_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            histogram: Mutex::new(LatencyHistogram::new()),
            errors_by_type: RwLock::new(HashMap::new()),
            status_codes: RwLock::new(HashMap::new()),
            time_series: Mutex::new(FixedSizeQueue::new(TIME_SERIES_CAPACITY)),
            last_point: Mutex::new(LastPoint {
                at: Instant::now(),
                total_requests: 0,
            }),
        }
    }

    // 记录一次请求的最终结果
    // total/success/errors只在这里推进, 每个失败请求恰好计入一次
    pub fn record_request(&self, latency: Duration, bytes_in: u64, bytes_out: u64, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Release);
        match success {
            true => self.success_requests.fetch_add(1, Ordering::Release),
            false => self.total_errors.fetch_add(1, Ordering::Release),
        };
        self.bytes_received.fetch_add(bytes_in, Ordering::Release);
        self.bytes_sent.fetch_add(bytes_out, Ordering::Release);
        if let Ok(mut histogram) = self.histogram.lock() {
            histogram.record(latency.as_micros() as u64);
        }
    }

    // 记录错误类型, 只更新分类表, 全局错误数由record_request统一推进
    pub fn record_error(&self, kind: &str) {
        if let Ok(map) = self.errors_by_type.read() {
            if let Some(counter) = map.get(kind) {
                counter.fetch_add(1, Ordering::Release);
                return;
            }
        }
        if let Ok(mut map) = self.errors_by_type.write() {
            map.entry(kind.to_string())
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .fetch_add(1, Ordering::Release);
        }
    }

    pub fn record_status(&self, code: u16) {
        if let Ok(map) = self.status_codes.read() {
            if let Some(counter) = map.get(&code) {
                counter.fetch_add(1, Ordering::Release);
                return;
            }
        }
        if let Ok(mut map) = self.status_codes.write() {
            map.entry(code)
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .fetch_add(1, Ordering::Release);
        }
    }

    // 获取当前快照, 顺带在满足间隔条件时追加一个时间序列点
    pub fn snapshot(&self) -> Snapshot {
        let total_requests = self.total_requests.load(Ordering::Acquire);
        let total_errors = self.total_errors.load(Ordering::Acquire);

        let mut errors_by_type = HashMap::new();
        if let Ok(map) = self.errors_by_type.read() {
            for (kind, counter) in map.iter() {
                errors_by_type.insert(kind.clone(), counter.load(Ordering::Acquire));
            }
        }
        let mut status_codes = HashMap::new();
        if let Ok(map) = self.status_codes.read() {
            for (code, counter) in map.iter() {
                status_codes.insert(*code, counter.load(Ordering::Acquire));
            }
        }

        let (latency, latency_clamped) = match self.histogram.lock() {
            Ok(histogram) => (Self::latency_stats(&histogram), histogram.clamped()),
            Err(_) => (LatencyStats::default(), 0),
        };

        let snapshot = Snapshot {
            total_requests,
            success_requests: self.success_requests.load(Ordering::Acquire),
            total_errors,
            bytes_received: self.bytes_received.load(Ordering::Acquire),
            bytes_sent: self.bytes_sent.load(Ordering::Acquire),
            avg_latency: latency.mean,
            p99_latency: latency.p99,
            latency,
            latency_clamped,
            errors_by_type,
            status_codes,
            timestamp: Utc::now(),
        };

        self.record_time_point(&snapshot);
        snapshot
    }

    fn latency_stats(histogram: &LatencyHistogram) -> LatencyStats {
        LatencyStats {
            min: Duration::from_micros(histogram.min()),
            max: Duration::from_micros(histogram.max()),
            mean: Duration::from_micros(histogram.mean() as u64),
            stddev: Duration::from_micros(histogram.stddev() as u64),
            p50: Duration::from_micros(histogram.percentile(50.0)),
            p75: Duration::from_micros(histogram.percentile(75.0)),
            p90: Duration::from_micros(histogram.percentile(90.0)),
            p95: Duration::from_micros(histogram.percentile(95.0)),
            p99: Duration::from_micros(histogram.percentile(99.0)),
            p999: Duration::from_micros(histogram.percentile(99.9)),
        }
    }

    // 追加时间序列点, 间隔不足1秒直接跳过
    // rps使用保留下来的上个点的总请求数计算真实增量
    fn record_time_point(&self, snapshot: &Snapshot) {
        let mut last = match self.last_point.lock() {
            Ok(last) => last,
            Err(_) => return,
        };
        let now = Instant::now();
        let elapsed = now.duration_since(last.at).as_secs_f64();
        if elapsed < 1.0 {
            return;
        }

        let delta = snapshot.total_requests.saturating_sub(last.total_requests);
        let rps = delta as f64 / elapsed;
        let error_rate = match snapshot.total_requests > 0 {
            true => snapshot.total_errors as f64 / snapshot.total_requests as f64,
            false => 0.0,
        };

        if let Ok(mut series) = self.time_series.lock() {
            series.push(TimePoint {
                timestamp: snapshot.timestamp,
                rps,
                avg_latency: snapshot.avg_latency,
                error_rate,
            });
        }

        last.at = now;
        last.total_requests = snapshot.total_requests;
    }

    // 时间序列的值拷贝
    pub fn time_series(&self) -> Vec<TimePoint> {
        match self.time_series.lock() {
            Ok(series) => series.to_vec(),
            Err(_) => Vec::new(),
        }
    }

    // 重置所有统计, 只允许在没有worker活跃时调用
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Release);
        self.success_requests.store(0, Ordering::Release);
        self.total_errors.store(0, Ordering::Release);
        self.bytes_received.store(0, Ordering::Release);
        self.bytes_sent.store(0, Ordering::Release);
        if let Ok(mut histogram) = self.histogram.lock() {
            histogram.reset();
        }
        if let Ok(mut map) = self.errors_by_type.write() {
            map.clear();
        }
        if let Ok(mut map) = self.status_codes.write() {
            map.clear();
        }
        if let Ok(mut series) = self.time_series.lock() {
            series.clear();
        }
        if let Ok(mut last) = self.last_point.lock() {
            last.at = Instant::now();
            last.total_requests = 0;
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
