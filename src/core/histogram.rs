use hdrhistogram::Histogram;

// 可记录范围: 1微秒到1小时, 3位有效数字
const LOWEST_TRACKABLE_MICROS: u64 = 1;
const HIGHEST_TRACKABLE_MICROS: u64 = 3_600_000_000;

// 延迟统计桶, 微秒精度
// 并发访问由持有者(collector)加锁保证, 快照总是观察到一致的总和
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
    // 超出可记录范围被钳位的样本数
    clamped: u64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        LatencyHistogram {
            histogram: Histogram::new_with_bounds(
                LOWEST_TRACKABLE_MICROS,
                HIGHEST_TRACKABLE_MICROS,
                3,
            )
            .unwrap(),
            clamped: 0,
        }
    }

    // 记录一个延迟样本, 越界样本钳位到最近的边界并计数
    pub fn record(&mut self, micros: u64) {
        let value = micros.clamp(LOWEST_TRACKABLE_MICROS, HIGHEST_TRACKABLE_MICROS);
        if value != micros {
            self.clamped += 1;
        }
        if let Err(e) = self.histogram.record(value) {
            eprintln!("histogram记录数据错误:{:?}", e);
        }
    }

    // 指定百分位的延迟(微秒), p取值0-100
    pub fn percentile(&self, p: f64) -> u64 {
        self.histogram.value_at_quantile(p / 100.0)
    }

    pub fn min(&self) -> u64 {
        self.histogram.min()
    }

    pub fn max(&self) -> u64 {
        self.histogram.max()
    }

    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    pub fn stddev(&self) -> f64 {
        self.histogram.stdev()
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn clamped(&self) -> u64 {
        self.clamped
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
        self.clamped = 0;
    }

    // 深拷贝导出, 与内部状态完全脱离
    pub fn export(&self) -> LatencyHistogram {
        self.clone()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_accuracy() {
        let mut hist = LatencyHistogram::new();
        // 1..=10000微秒各记录一次, 真实分位数可以直接算出来
        for v in 1..=10_000u64 {
            hist.record(v);
        }
        assert_eq!(hist.count(), 10_000);
        // 3位有效数字分辨率内逼近真实分位数
        let p50 = hist.percentile(50.0);
        assert!((4990..=5010).contains(&p50), "p50={}", p50);
        let p99 = hist.percentile(99.0);
        assert!((9890..=9910).contains(&p99), "p99={}", p99);
        assert_eq!(hist.min(), 1);
        assert!(hist.max() >= 9990);
        assert!((hist.mean() - 5000.5).abs() < 10.0);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let mut hist = LatencyHistogram::new();
        hist.record(0);
        hist.record(HIGHEST_TRACKABLE_MICROS + 1);
        hist.record(100);
        assert_eq!(hist.clamped(), 2);
        assert_eq!(hist.count(), 3);
        assert_eq!(hist.min(), 1);
        assert!(hist.max() >= HIGHEST_TRACKABLE_MICROS / 2);
    }

    #[test]
    fn test_export_is_deep_copy() {
        let mut hist = LatencyHistogram::new();
        hist.record(500);
        let exported = hist.export();
        hist.record(1000);
        assert_eq!(exported.count(), 1);
        assert_eq!(hist.count(), 2);
    }

    #[test]
    fn test_reset() {
        let mut hist = LatencyHistogram::new();
        hist.record(0);
        hist.record(42);
        hist.reset();
        assert_eq!(hist.count(), 0);
        assert_eq!(hist.clamped(), 0);
    }
}
