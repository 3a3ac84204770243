use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use ticker_core::{
    clock::Clock,
    config::DispatcherConfig,
    models::{DueTicker, TickerKind},
    traits::TickerStore,
    SchedulerResult,
};
use ticker_infrastructure::{MetricsCollector, StructuredLogger};
use ticker_worker::{ExecutionReport, TickerExecutionManager};

use crate::cron_utils::CronScheduler;
use crate::dependency_checker::DependencyCheckService;
use crate::outcome_handler::OutcomeHandler;
use crate::strategies::{mark_superseded, DispatchStrategy};

/// 一个调度周期的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 本周期新物化的 CRON 触发
    pub materialized: usize,
    /// 查询到的到期行
    pub due: usize,
    /// 抢占成功并交给执行引擎的行
    pub claimed: usize,
    /// 抢占失败（已被其他节点拿走）的行
    pub conflicts: usize,
    /// 并发槽位耗尽，推迟到下个周期的行
    pub deferred: usize,
    /// 被更新边界取代而直接跳过的触发
    pub skipped: usize,
}

/// 正在执行的任务计数，归零时唤醒等待者
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// 调度器：固定间隔轮询，物化 CRON 触发、抢占到期任务并派发执行
pub struct Dispatcher {
    node_id: String,
    config: DispatcherConfig,
    store: Arc<dyn TickerStore>,
    executor: Arc<TickerExecutionManager>,
    outcome_handler: Arc<OutcomeHandler>,
    dependency_checker: Arc<dyn DependencyCheckService>,
    strategy: Arc<dyn DispatchStrategy>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn TickerStore>,
        executor: Arc<TickerExecutionManager>,
        outcome_handler: Arc<OutcomeHandler>,
        dependency_checker: Arc<dyn DependencyCheckService>,
        strategy: Arc<dyn DispatchStrategy>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            node_id: executor.node_id().to_string(),
            config,
            store,
            executor,
            outcome_handler,
            dependency_checker,
            strategy,
            clock,
            metrics,
            permits,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// 向本节点正在运行的任务发出取消信号
    pub async fn cancel(&self, id: Uuid) -> bool {
        self.executor.cancel(id).await
    }

    /// 等待所有已派发的执行结束并落库
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 执行一个调度周期
    ///
    /// 列表或抢占阶段的存储错误会中止本周期；已派发的任务不受影响，
    /// 尚未抢占的任务状态不变。
    pub async fn run_cycle(&self) -> SchedulerResult<CycleReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = CycleReport {
            materialized: self.materialize_occurrences(now).await?,
            ..Default::default()
        };

        let mut candidates = self.store.find_due(TickerKind::Time, now).await?;
        candidates.extend(self.store.find_due(TickerKind::CronOccurrence, now).await?);
        report.due = candidates.len();

        if self.config.skip_superseded_occurrences {
            let marked = mark_superseded(&mut candidates);
            if marked > 0 {
                debug!("{} 个过期的 CRON 触发将被跳过", marked);
            }
        }
        let (superseded, live): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|t| t.superseded_by.is_some());

        for ticker in superseded {
            self.skip_superseded(ticker, now, &mut report).await?;
        }

        let plan = self.strategy.plan(live);
        let mut bounded = plan.bounded.into_iter();
        while let Some(ticker) = bounded.next() {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                report.deferred = 1 + bounded.len();
                debug!("并发槽位已满，{} 个任务推迟到下个周期", report.deferred);
                break;
            };
            self.claim_and_spawn(ticker, Some(permit), now, &mut report)
                .await?;
        }
        for ticker in plan.long_running {
            self.claim_and_spawn(ticker, None, now, &mut report).await?;
        }

        self.metrics.record_cycle(
            started.elapsed().as_secs_f64(),
            report.materialized as u64,
            report.claimed as u64,
            report.conflicts as u64,
            report.deferred as u64,
        );
        self.metrics.update_running(self.in_flight());
        if report.due > 0 {
            info!(
                "调度周期完成: 到期 {}, 抢占 {}, 冲突 {}, 推迟 {}, 跳过 {}",
                report.due, report.claimed, report.conflicts, report.deferred, report.skipped
            );
        }
        Ok(report)
    }

    /// 运行调度循环直到收到关闭信号
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动调度循环: 节点 {}, 轮询间隔 {}ms, 并发上限 {}, 策略 {}",
            self.node_id,
            self.config.poll_interval_ms,
            self.config.max_concurrency,
            self.strategy.name()
        );
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let span = tracing::info_span!("dispatch_cycle", node.id = %self.node_id);
                    if let Err(e) = self.run_cycle().instrument(span).await {
                        StructuredLogger::log_cycle_failed(&self.node_id, "dispatch", &e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出调度循环");
                    break;
                }
            }
        }
    }

    /// 为每个 CRON 任务物化窗口 `(max(created_at, now - lookback), now]` 内的边界
    async fn materialize_occurrences(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let mut created = 0;
        for cron in self.store.list_cron_tickers().await? {
            let schedule = match CronScheduler::new(&cron.expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!("CRON任务 {} 的表达式无效，跳过物化: {}", cron.id, e);
                    continue;
                }
            };
            let from = cron.created_at.max(now - self.config.lookback());
            for boundary in
                schedule.occurrences_between(from, now, self.config.max_occurrences_per_cycle)
            {
                let (_, is_new) = self.store.upsert_occurrence(cron.id, boundary).await?;
                if is_new {
                    created += 1;
                }
            }
            let next = schedule.next_occurrence(now);
            if next != cron.next_occurrence {
                self.store.set_next_occurrence(cron.id, next).await?;
            }
        }
        Ok(created)
    }

    async fn skip_superseded(
        &self,
        ticker: DueTicker,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> SchedulerResult<()> {
        if !self
            .store
            .try_claim(ticker.kind, ticker.id, &self.node_id, now)
            .await?
        {
            report.conflicts += 1;
            return Ok(());
        }
        let reason = match ticker.superseded_by {
            Some(boundary) => format!("superseded by occurrence at {}", boundary.to_rfc3339()),
            None => "superseded by a newer occurrence".to_string(),
        };
        if self
            .outcome_handler
            .settle(ExecutionReport::skipped(ticker, reason))
            .await
            .is_some()
        {
            report.skipped += 1;
        }
        Ok(())
    }

    async fn claim_and_spawn(
        &self,
        mut ticker: DueTicker,
        permit: Option<OwnedSemaphorePermit>,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> SchedulerResult<()> {
        if !self
            .store
            .try_claim(ticker.kind, ticker.id, &self.node_id, now)
            .await?
        {
            debug!("Ticker {} 已被其他节点抢占，跳过", ticker.id);
            report.conflicts += 1;
            return Ok(());
        }
        ticker.mark_claimed(&self.node_id, now);
        let cancellation = self.executor.register_running(ticker.id).await;
        report.claimed += 1;
        StructuredLogger::log_ticker_claimed(
            ticker.kind,
            ticker.id,
            &ticker.function,
            &self.node_id,
            ticker.execution_time,
        );

        if ticker.kind == TickerKind::Time {
            if let Err(e) = self.dependency_checker.on_parent_started(ticker.id).await {
                warn!("Ticker {} 的 InProgress 子任务触发失败: {}", ticker.id, e);
            }
        }

        let guard = InFlightGuard::enter(&self.in_flight);
        let executor = Arc::clone(&self.executor);
        let outcome_handler = Arc::clone(&self.outcome_handler);
        let span = tracing::info_span!(
            "execute_ticker",
            ticker.id = %ticker.id,
            ticker.function = %ticker.function
        );
        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                let execution = executor.execute_registered(ticker, cancellation).await;
                outcome_handler.settle(execution).await;
            }
            .instrument(span),
        );
        Ok(())
    }
}
