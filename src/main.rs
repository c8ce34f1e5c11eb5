use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Error;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use httpbench::models::result::BenchResult;
use httpbench::reporter;
use httpbench::{Config, Engine};

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP 基准测试工具")]
struct Args {
    /// 配置文件路径
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// 目标URL
    #[arg(long)]
    url: Option<String>,

    /// 并发数
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// 测试持续时间, 如10s、1m
    #[arg(short = 'd', long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// 总请求数(0表示基于时间)
    #[arg(short = 'n', long)]
    requests: Option<u64>,

    /// 每秒请求数限制(0表示无限制)
    #[arg(long)]
    rps: Option<u32>,

    /// 启用HTTP/2
    #[arg(long)]
    http2: bool,

    /// 启用HTTP/3 (QUIC)
    #[arg(long)]
    http3: bool,

    /// 输出格式: console, json, csv, html
    #[arg(long)]
    output: Option<String>,

    /// 报告输出文件
    #[arg(long)]
    report: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // 加载配置
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置加载失败: {:?}", e);
            std::process::exit(1);
        }
    };

    // 验证配置
    if let Err(e) = config.validate() {
        eprintln!("配置验证失败: {:?}", e);
        std::process::exit(1);
    }

    // 信号处理, SIGINT/SIGTERM触发整场取消
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_shutdown_signal().await;
            eprintln!("收到中断信号,正在优雅退出...");
            cancel.cancel();
        }
    });

    // 运行基准测试
    if let Err(e) = run_benchmark(config, cancel).await {
        eprintln!("基准测试执行失败: {:?}", e);
        std::process::exit(1);
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                eprintln!("注册SIGTERM失败: {:?}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// 命令行参数覆盖配置文件
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match !args.config.is_empty() && Path::new(&args.config).exists() {
        true => Config::load_from_file(&args.config)?,
        false => Config::default(),
    };

    if let Some(url) = &args.url {
        config.target.url = url.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.load.concurrency = concurrency;
    }
    if let Some(duration) = args.duration {
        config.load.duration = duration;
    }
    if let Some(requests) = args.requests {
        config.load.total_requests = requests;
    }
    if let Some(rps) = args.rps {
        config.load.rate_limit = rps;
    }
    if args.http2 {
        config.protocol.http2_enabled = true;
    }
    if args.http3 {
        config.protocol.http3_enabled = true;
    }
    if let Some(output) = &args.output {
        config.output.format = output.clone();
    }
    if let Some(report) = &args.report {
        config.output.report_file = report.clone();
    }

    Ok(config)
}

async fn run_benchmark(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    println!("🚀 HTTP 基准测试工具 v{}", env!("CARGO_PKG_VERSION"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("目标: {}", config.target.url);
    println!("并发: {}", config.load.concurrency);
    println!("持续时间: {:?}", config.load.duration);
    if config.protocol.http2_enabled {
        println!("协议: HTTP/2");
    } else if config.protocol.http3_enabled {
        println!("协议: HTTP/3 (QUIC)");
    } else {
        println!("协议: HTTP/1.1");
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let mut engine =
        Engine::new(config.clone()).map_err(|e| Error::msg(format!("创建基准测试器失败: {:?}", e)))?;

    println!("⏳ 开始测试...");
    let start = Instant::now();
    let results = engine
        .run(cancel)
        .await
        .map_err(|e| Error::msg(format!("执行测试失败: {:?}", e)))?;
    engine.close();

    println!("\n✅ 测试完成 (耗时: {:?})\n", start.elapsed());

    // 生成报告
    let rep = reporter::new(&config.output.format);
    rep.generate(&results, &config.output.report_file)
        .map_err(|e| Error::msg(format!("生成报告失败: {:?}", e)))?;

    // 控制台输出摘要
    if config.output.format == "console" || !config.output.report_file.is_empty() {
        print_summary(&results);
    }

    Ok(())
}

fn print_summary(results: &BenchResult) {
    println!("📊 测试结果摘要");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("总请求数:     {}", results.total_requests);
    println!("成功请求:     {}", results.success_requests);
    println!("失败请求:     {}", results.failed_requests);
    println!("成功率:       {:.2}%", results.success_rate());
    println!();
    println!("📈 性能指标");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("吞吐量:       {:.2} req/s", results.throughput);
    println!("平均延迟:     {}", format_latency(results.latency.mean));
    println!("P50延迟:      {}", format_latency(results.latency.p50));
    println!("P90延迟:      {}", format_latency(results.latency.p90));
    println!("P95延迟:      {}", format_latency(results.latency.p95));
    println!("P99延迟:      {}", format_latency(results.latency.p99));
    println!("最小延迟:     {}", format_latency(results.latency.min));
    println!("最大延迟:     {}", format_latency(results.latency.max));
    println!();
    println!("📦 数据传输");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("总接收:       {}", format_bytes(results.bytes_received));
    println!("总发送:       {}", format_bytes(results.bytes_sent));
    println!("接收速率:     {}/s", format_bytes(results.receive_rate() as u64));

    if !results.errors_by_type.is_empty() {
        println!();
        println!("❌ 错误统计");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (error_type, count) in &results.errors_by_type {
            println!("{:<20}: {}", error_type, count);
        }
    }

    if !results.status_codes.is_empty() {
        println!();
        println!("🔢 状态码分布");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (code, count) in &results.status_codes {
            println!("{:<20}: {}", code, count);
        }
    }
}

fn format_latency(latency: Duration) -> String {
    format!("{:.2}ms", latency.as_secs_f64() * 1000.0)
}

fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let units = ['K', 'M', 'G', 'T', 'P', 'E'];
    format!("{:.2} {}B", bytes as f64 / div as f64, units[exp])
}
