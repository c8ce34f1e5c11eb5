use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::client::build_http_client;
use crate::core::collector::Collector;
use crate::core::concurrency_controller::ConcurrencyController;
use crate::core::executor::RequestExecutor;
use crate::core::rate_limiter::RateLimiter;
use crate::core::template::TemplateEngine;
use crate::core::validator::Validator;
use crate::core::{generator, monitor, worker};
use crate::models::config::{Config, LoadPattern};
use crate::models::result::BenchResult;

// 基准测试引擎
// 独占收集器、速率限制器、执行器和全部worker任务,
// 对外只交出快照和最终结果的值拷贝
pub struct Engine {
    config: Arc<Config>,
    client: Client,
    collector: Arc<Collector>,
    validator: Arc<Validator>,
    template: Arc<TemplateEngine>,
    rate_limiter: Option<RateLimiter>,
    test_start: Instant,
}

impl Engine {
    pub fn new(config: Config) -> anyhow::Result<Engine> {
        let client = build_http_client(&config)?;
        let validator = Arc::new(Validator::new(&config.validation));
        let template = Arc::new(TemplateEngine::new(&config.request.template));
        let rate_limiter = match config.load.rate_limit > 0 {
            true => Some(RateLimiter::new(config.load.rate_limit)),
            false => None,
        };
        Ok(Engine {
            config: Arc::new(config),
            client,
            collector: Arc::new(Collector::new()),
            validator,
            template,
            rate_limiter,
            test_start: Instant::now(),
        })
    }

    // 执行基准测试, 取消或时间耗尽都会返回已收集到的部分结果
    pub async fn run(&mut self, cancel: CancellationToken) -> anyhow::Result<BenchResult> {
        self.test_start = Instant::now();

        // 工作域: 引擎内部的任务都挂在这个子token上
        let run_token = cancel.child_token();

        // duration作为整场压测的超时
        if !self.config.load.duration.is_zero() {
            let deadline_token = run_token.clone();
            let duration = self.config.load.duration;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => deadline_token.cancel(),
                    _ = deadline_token.cancelled() => {}
                }
            });
        }

        // 根据负载模式执行测试
        match self.config.load.load_pattern {
            LoadPattern::RampUp => self.run_ramp_up(run_token).await,
            LoadPattern::Burst => self.run_burst(run_token).await,
            LoadPattern::Constant => self.run_constant(run_token).await,
        }
    }

    // 恒定负载: 全部worker在t=0启动并保持到结束
    async fn run_constant(&mut self, cancel: CancellationToken) -> anyhow::Result<BenchResult> {
        let concurrency = self.config.load.concurrency;
        let (token_tx, token_rx) = async_channel::bounded::<()>(concurrency);
        let executor = self.build_executor();

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            handles.push(tokio::spawn(worker::run_worker(
                worker_id,
                Arc::clone(&executor),
                token_rx.clone(),
                cancel.clone(),
            )));
        }
        drop(token_rx);

        self.spawn_generator(token_tx, &cancel);
        self.spawn_monitor(&cancel);

        Self::join_workers(handles).await;
        cancel.cancel();
        Ok(self.generate_results())
    }

    // 渐进式负载: 按end预先启动worker池, 激活门逐步放行
    async fn run_ramp_up(&mut self, cancel: CancellationToken) -> anyhow::Result<BenchResult> {
        let ramp = self.config.load.ramp_up.clone();
        if !ramp.enabled {
            return self.run_constant(cancel).await;
        }

        println!(
            "📈 渐进式负载: {} -> {} (步数: {}, 每步: {:?})",
            ramp.start_concurrency,
            ramp.end_concurrency,
            ramp.steps,
            ramp.duration / ramp.steps.max(1) as u32
        );

        let end_concurrency = ramp.end_concurrency;
        let (token_tx, token_rx) = async_channel::bounded::<()>(end_concurrency);
        let executor = self.build_executor();

        let controller = Arc::new(ConcurrencyController::new(
            ramp.start_concurrency,
            end_concurrency,
            ramp.duration,
            ramp.steps,
        ));
        // 后台分发激活许可
        tokio::spawn({
            let controller = Arc::clone(&controller);
            let cancel = cancel.clone();
            async move {
                controller.distribute_permits(&cancel).await;
            }
        });

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(end_concurrency);
        for worker_id in 0..end_concurrency {
            let executor = Arc::clone(&executor);
            let token_rx = token_rx.clone();
            let cancel = cancel.clone();
            let semaphore = controller.semaphore();
            handles.push(tokio::spawn(async move {
                // 等待激活信号
                let permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = semaphore.acquire_owned() => permit,
                };
                match permit {
                    // 激活是永久性的, 许可不再归还
                    Ok(permit) => permit.forget(),
                    Err(_) => return,
                }
                worker::run_worker(worker_id, executor, token_rx, cancel).await;
            }));
        }
        drop(token_rx);

        self.spawn_generator(token_tx, &cancel);
        self.spawn_monitor(&cancel);

        Self::join_workers(handles).await;
        cancel.cancel();
        Ok(self.generate_results())
    }

    // 突发负载: base个worker持续运行, 每个间隔叠加一批突发worker
    async fn run_burst(&mut self, cancel: CancellationToken) -> anyhow::Result<BenchResult> {
        let burst = self.config.load.burst_mode.clone();
        if !burst.enabled {
            return self.run_constant(cancel).await;
        }

        println!(
            "💥 突发负载模式: 基准 {}, 突发 {} (持续: {:?}, 间隔: {:?})",
            burst.base_concurrency,
            burst.burst_concurrency,
            burst.burst_duration,
            burst.burst_interval
        );

        let (token_tx, token_rx) = async_channel::bounded::<()>(burst.burst_concurrency);
        let executor = self.build_executor();

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(burst.base_concurrency);
        for worker_id in 0..burst.base_concurrency {
            handles.push(tokio::spawn(worker::run_worker(
                worker_id,
                Arc::clone(&executor),
                token_rx.clone(),
                cancel.clone(),
            )));
        }

        // 突发控制任务: 突发worker挂在子token上, +burst_duration时准点终止
        let burst_controller: JoinHandle<()> = tokio::spawn({
            let executor = Arc::clone(&executor);
            let token_rx = token_rx.clone();
            let cancel = cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(burst.burst_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // 第一个tick立即完成, 第一次突发从一个完整间隔之后开始
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            let extra = burst.burst_concurrency - burst.base_concurrency;
                            println!("  💥 触发突发: +{} 并发", extra);
                            let burst_token = cancel.child_token();
                            let mut burst_handles: Vec<JoinHandle<()>> = Vec::with_capacity(extra);
                            for i in 0..extra {
                                burst_handles.push(tokio::spawn(worker::run_worker(
                                    burst.base_concurrency + i,
                                    Arc::clone(&executor),
                                    token_rx.clone(),
                                    burst_token.clone(),
                                )));
                            }
                            tokio::select! {
                                _ = tokio::time::sleep(burst.burst_duration) => {}
                                _ = cancel.cancelled() => {}
                            }
                            burst_token.cancel();
                            join_all(burst_handles).await;
                            println!("  ✓ 突发结束");
                        }
                    }
                }
            }
        });
        drop(token_rx);

        self.spawn_generator(token_tx, &cancel);
        self.spawn_monitor(&cancel);

        Self::join_workers(handles).await;
        cancel.cancel();
        if let Err(e) = burst_controller.await {
            eprintln!("突发控制任务异常退出::{:?}", e);
        }
        Ok(self.generate_results())
    }

    fn build_executor(&self) -> Arc<RequestExecutor> {
        Arc::new(RequestExecutor::new(
            self.client.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.collector),
            Arc::clone(&self.validator),
            Arc::clone(&self.template),
        ))
    }

    fn spawn_generator(&mut self, token_tx: async_channel::Sender<()>, cancel: &CancellationToken) {
        tokio::spawn(generator::generate_requests(
            token_tx,
            self.rate_limiter.take(),
            self.config.load.total_requests,
            cancel.clone(),
        ));
    }

    fn spawn_monitor(&self, cancel: &CancellationToken) {
        if self.config.output.realtime_monitor {
            tokio::spawn(monitor::realtime_monitor(
                Arc::clone(&self.collector),
                self.config.output.monitor_interval,
                self.test_start,
                cancel.clone(),
            ));
        }
    }

    // 等待全部worker完成, 进行中的请求允许跑完
    async fn join_workers(handles: Vec<JoinHandle<()>>) {
        let task_results = join_all(handles).await;
        for task_result in task_results {
            if let Err(e) = task_result {
                eprintln!("worker协程被取消或意外停止::{:?}", e);
            }
        }
    }

    // 从最终快照生成结果, 零请求的场景所有比率都有除零保护
    fn generate_results(&self) -> BenchResult {
        let snapshot = self.collector.snapshot();
        let duration = self.test_start.elapsed();
        let throughput = match duration.as_secs_f64() > 0.0 {
            true => snapshot.total_requests as f64 / duration.as_secs_f64(),
            false => 0.0,
        };
        BenchResult {
            total_requests: snapshot.total_requests,
            success_requests: snapshot.success_requests,
            failed_requests: snapshot.total_errors,
            duration,
            throughput,
            bytes_received: snapshot.bytes_received,
            bytes_sent: snapshot.bytes_sent,
            latency: snapshot.latency,
            latency_clamped: snapshot.latency_clamped,
            errors_by_type: snapshot.errors_by_type,
            status_codes: snapshot.status_codes,
            time_series: self.collector.time_series(),
        }
    }

    // 释放速率限制器和http客户端
    pub fn close(self) {}
}
