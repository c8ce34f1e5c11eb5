use std::time::Duration;

use anyhow::Error;
use chrono::Local;
use serde_json::json;

use crate::models::result::BenchResult;

// 报告生成器, 接收最终结果的值拷贝, 不接触引擎内部
pub trait Reporter {
    fn generate(&self, results: &BenchResult, output_path: &str) -> anyhow::Result<()>;
}

// 根据输出格式创建报告生成器
pub fn new(format: &str) -> Box<dyn Reporter> {
    match format {
        "json" => Box::new(JsonReporter),
        "csv" => Box::new(CsvReporter),
        "html" => Box::new(HtmlReporter),
        _ => Box::new(ConsoleReporter),
    }
}

fn millis(latency: Duration) -> f64 {
    latency.as_secs_f64() * 1000.0
}

// 控制台报告, 摘要在main中输出
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn generate(&self, _results: &BenchResult, _output_path: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn generate(&self, results: &BenchResult, output_path: &str) -> anyhow::Result<()> {
        let time_series: Vec<serde_json::Value> = results
            .time_series
            .iter()
            .map(|point| {
                json!({
                    "timestamp": point.timestamp.to_rfc3339(),
                    "rps": point.rps,
                    "avg_latency_ms": millis(point.avg_latency),
                    "error_rate": point.error_rate,
                })
            })
            .collect();

        let report = json!({
            "summary": {
                "total_requests": results.total_requests,
                "success_requests": results.success_requests,
                "failed_requests": results.failed_requests,
                "success_rate": results.success_rate(),
                "duration_seconds": results.duration.as_secs_f64(),
                "throughput_rps": results.throughput,
            },
            "latency": {
                "min_ms": millis(results.latency.min),
                "max_ms": millis(results.latency.max),
                "mean_ms": millis(results.latency.mean),
                "stddev_ms": millis(results.latency.stddev),
                "p50_ms": millis(results.latency.p50),
                "p75_ms": millis(results.latency.p75),
                "p90_ms": millis(results.latency.p90),
                "p95_ms": millis(results.latency.p95),
                "p99_ms": millis(results.latency.p99),
                "p999_ms": millis(results.latency.p999),
            },
            "transfer": {
                "bytes_received": results.bytes_received,
                "bytes_sent": results.bytes_sent,
                "receive_rate_bps": results.receive_rate(),
                "send_rate_bps": results.send_rate(),
            },
            "errors": &results.errors_by_type,
            "status_codes": &results.status_codes,
            "time_series": time_series,
            "generated_at": Local::now().to_rfc3339(),
        });

        let data = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::msg(format!("JSON序列化失败: {:?}", e)))?;

        match output_path.is_empty() {
            true => println!("{}", data),
            false => {
                std::fs::write(output_path, data)
                    .map_err(|e| Error::msg(format!("写入文件失败: {:?}", e)))?;
                println!("\n📄 JSON报告已保存: {}", output_path);
            }
        }
        Ok(())
    }
}

pub struct CsvReporter;

impl Reporter for CsvReporter {
    fn generate(&self, results: &BenchResult, output_path: &str) -> anyhow::Result<()> {
        let path = match output_path.is_empty() {
            true => format!(
                "benchmark_report_{}.csv",
                Local::now().format("%Y%m%d_%H%M%S")
            ),
            false => output_path.to_string(),
        };

        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| Error::msg(format!("创建文件失败: {:?}", e)))?;

        // 摘要
        writer.write_record(["Metric", "Value"])?;
        writer.write_record(["Total Requests", results.total_requests.to_string().as_str()])?;
        writer.write_record(["Success Requests", results.success_requests.to_string().as_str()])?;
        writer.write_record(["Failed Requests", results.failed_requests.to_string().as_str()])?;
        writer.write_record(["Success Rate", format!("{:.2}%", results.success_rate()).as_str()])?;
        writer.write_record([
            "Duration (seconds)",
            format!("{:.2}", results.duration.as_secs_f64()).as_str(),
        ])?;
        writer.write_record(["Throughput (req/s)", format!("{:.2}", results.throughput).as_str()])?;
        writer.write_record([""; 2])?;

        // 延迟统计
        writer.write_record(["Latency Metric", "Value (ms)"])?;
        writer.write_record(["Min", format!("{:.2}", millis(results.latency.min)).as_str()])?;
        writer.write_record(["Max", format!("{:.2}", millis(results.latency.max)).as_str()])?;
        writer.write_record(["Mean", format!("{:.2}", millis(results.latency.mean)).as_str()])?;
        writer.write_record(["StdDev", format!("{:.2}", millis(results.latency.stddev)).as_str()])?;
        writer.write_record(["P50", format!("{:.2}", millis(results.latency.p50)).as_str()])?;
        writer.write_record(["P75", format!("{:.2}", millis(results.latency.p75)).as_str()])?;
        writer.write_record(["P90", format!("{:.2}", millis(results.latency.p90)).as_str()])?;
        writer.write_record(["P95", format!("{:.2}", millis(results.latency.p95)).as_str()])?;
        writer.write_record(["P99", format!("{:.2}", millis(results.latency.p99)).as_str()])?;
        writer.write_record(["P99.9", format!("{:.2}", millis(results.latency.p999)).as_str()])?;
        writer.write_record([""; 2])?;

        // 传输统计
        writer.write_record(["Transfer Metric", "Value"])?;
        writer.write_record(["Bytes Received", results.bytes_received.to_string().as_str()])?;
        writer.write_record(["Bytes Sent", results.bytes_sent.to_string().as_str()])?;
        writer.write_record([
            "Receive Rate (bytes/s)",
            format!("{:.2}", results.receive_rate()).as_str(),
        ])?;
        writer.write_record([""; 2])?;

        // 错误统计
        if !results.errors_by_type.is_empty() {
            writer.write_record(["Error Type", "Count"])?;
            for (error_type, count) in &results.errors_by_type {
                writer.write_record([error_type.as_str(), count.to_string().as_str()])?;
            }
            writer.write_record([""; 2])?;
        }

        // 状态码统计
        if !results.status_codes.is_empty() {
            writer.write_record(["Status Code", "Count"])?;
            for (code, count) in &results.status_codes {
                writer.write_record([code.to_string(), count.to_string()])?;
            }
            writer.write_record([""; 2])?;
        }

        // 时间序列数据
        if !results.time_series.is_empty() {
            writer.write_record(["Timestamp", "RPS", "Avg Latency (ms)", "Error Rate"])?;
            for point in &results.time_series {
                writer.write_record([
                    point.timestamp.to_rfc3339(),
                    format!("{:.2}", point.rps),
                    format!("{:.2}", millis(point.avg_latency)),
                    format!("{:.4}", point.error_rate),
                ])?;
            }
        }

        writer
            .flush()
            .map_err(|e| Error::msg(format!("写入文件失败: {:?}", e)))?;
        println!("\n📊 CSV报告已保存: {}", path);
        Ok(())
    }
}

pub struct HtmlReporter;

impl Reporter for HtmlReporter {
    fn generate(&self, results: &BenchResult, output_path: &str) -> anyhow::Result<()> {
        let path = match output_path.is_empty() {
            true => format!(
                "benchmark_report_{}.html",
                Local::now().format("%Y%m%d_%H%M%S")
            ),
            false => output_path.to_string(),
        };

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>HTTP Benchmark Report</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; background: #f5f5f5; }}
        .container {{ max-width: 1200px; margin: 0 auto; background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; border-bottom: 3px solid #4CAF50; padding-bottom: 10px; }}
        h2 {{ color: #555; margin-top: 30px; }}
        .metric {{ display: inline-block; width: 200px; margin: 10px; padding: 15px; background: #f9f9f9; border-left: 4px solid #4CAF50; }}
        .metric-label {{ font-size: 12px; color: #666; }}
        .metric-value {{ font-size: 24px; font-weight: bold; color: #333; }}
        table {{ width: 100%; border-collapse: collapse; margin-top: 20px; }}
        th, td {{ padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }}
        th {{ background-color: #4CAF50; color: white; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>🚀 HTTP Benchmark Report</h1>
        <p>Generated: {generated}</p>

        <h2>📊 Summary</h2>
        <div class="metric">
            <div class="metric-label">Total Requests</div>
            <div class="metric-value">{total}</div>
        </div>
        <div class="metric">
            <div class="metric-label">Success Rate</div>
            <div class="metric-value">{success_rate:.2}%</div>
        </div>
        <div class="metric">
            <div class="metric-label">Throughput</div>
            <div class="metric-value">{throughput:.2} req/s</div>
        </div>
        <div class="metric">
            <div class="metric-label">Avg Latency</div>
            <div class="metric-value">{mean:.2}ms</div>
        </div>

        <h2>📈 Latency Percentiles</h2>
        <table>
            <tr><th>Percentile</th><th>Latency (ms)</th></tr>
            <tr><td>P50</td><td>{p50:.2}</td></tr>
            <tr><td>P75</td><td>{p75:.2}</td></tr>
            <tr><td>P90</td><td>{p90:.2}</td></tr>
            <tr><td>P95</td><td>{p95:.2}</td></tr>
            <tr><td>P99</td><td>{p99:.2}</td></tr>
            <tr><td>P99.9</td><td>{p999:.2}</td></tr>
        </table>
    </div>
</body>
</html>"#,
            generated = Local::now().format("%Y-%m-%d %H:%M:%S"),
            total = results.total_requests,
            success_rate = results.success_rate(),
            throughput = results.throughput,
            mean = millis(results.latency.mean),
            p50 = millis(results.latency.p50),
            p75 = millis(results.latency.p75),
            p90 = millis(results.latency.p90),
            p95 = millis(results.latency.p95),
            p99 = millis(results.latency.p99),
            p999 = millis(results.latency.p999),
        );

        std::fs::write(&path, html).map_err(|e| Error::msg(format!("写入文件失败: {:?}", e)))?;
        println!("\n🌐 HTML报告已保存: {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::result::LatencyStats;
    use std::collections::HashMap;

    fn empty_results() -> BenchResult {
        BenchResult {
            total_requests: 0,
            success_requests: 0,
            failed_requests: 0,
            duration: Duration::ZERO,
            throughput: 0.0,
            bytes_received: 0,
            bytes_sent: 0,
            latency: LatencyStats::default(),
            latency_clamped: 0,
            errors_by_type: HashMap::new(),
            status_codes: HashMap::new(),
            time_series: Vec::new(),
        }
    }

    #[test]
    fn test_zero_requests_rates_are_guarded() {
        // 零请求的结果所有比率都必须是0而不是NaN
        let results = empty_results();
        assert_eq!(results.success_rate(), 0.0);
        assert_eq!(results.error_rate(), 0.0);
        assert_eq!(results.receive_rate(), 0.0);
        assert_eq!(results.send_rate(), 0.0);
    }

    #[test]
    fn test_json_report_structure() {
        let dir = std::env::temp_dir().join("httpbench_json_report_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.json");
        let path_str = path.to_str().unwrap();

        let mut results = empty_results();
        results.total_requests = 10;
        results.success_requests = 9;
        results.failed_requests = 1;
        results.duration = Duration::from_secs(2);
        results.throughput = 5.0;
        results.errors_by_type.insert("validation".to_string(), 1);
        results.status_codes.insert(200, 9);
        results.status_codes.insert(500, 1);

        JsonReporter.generate(&results, path_str).unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        let report: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(report["summary"]["total_requests"], 10);
        assert_eq!(report["summary"]["success_rate"], 90.0);
        assert_eq!(report["errors"]["validation"], 1);
        assert_eq!(report["status_codes"]["200"], 9);
        assert!(report["latency"]["p99_ms"].is_number());
        assert!(report["generated_at"].is_string());
        assert!(report["time_series"].is_array());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_csv_report_written() {
        let dir = std::env::temp_dir().join("httpbench_csv_report_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.csv");
        let path_str = path.to_str().unwrap();

        let mut results = empty_results();
        results.total_requests = 3;
        results.success_requests = 3;
        CsvReporter.generate(&results, path_str).unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.contains("Total Requests,3"));
        assert!(data.contains("Latency Metric"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
