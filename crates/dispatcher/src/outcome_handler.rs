use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use ticker_core::{
    models::{TickerCompletion, TickerKind, TickerStatus},
    traits::TickerStore,
    SchedulerResult,
};
use ticker_infrastructure::{MetricsCollector, StructuredLogger};
use ticker_worker::{ExecutionOutcome, ExecutionReport};

use crate::dependency_checker::DependencyCheckService;
use crate::retry_service::{RetryDecision, RetryService};

const WRITEBACK_ATTEMPTS: u32 = 3;
const WRITEBACK_BACKOFF: Duration = Duration::from_millis(100);

/// 结果落库后的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOutcome {
    pub status: TickerStatus,
    pub next_due: Option<DateTime<Utc>>,
    /// 因本次结果被排入队列的子任务数
    pub children_queued: usize,
}

/// 把执行结果写回存储：终态、重试排期、链式子任务
///
/// 所有写回都以本节点持有抢占为前提；抢占已被回收并转给其他节点时，
/// 结果被丢弃，也不会触发重试或子任务。
pub struct OutcomeHandler {
    node_id: String,
    store: Arc<dyn TickerStore>,
    retry_service: Arc<dyn RetryService>,
    dependency_checker: Arc<dyn DependencyCheckService>,
    metrics: Arc<MetricsCollector>,
    writeback_backoff: Duration,
}

impl OutcomeHandler {
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<dyn TickerStore>,
        retry_service: Arc<dyn RetryService>,
        dependency_checker: Arc<dyn DependencyCheckService>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            retry_service,
            dependency_checker,
            metrics,
            writeback_backoff: WRITEBACK_BACKOFF,
        }
    }

    pub fn with_writeback_backoff(mut self, backoff: Duration) -> Self {
        self.writeback_backoff = backoff;
        self
    }

    /// 写回结果，存储出错时按指数退避重试；仍然失败则释放抢占，
    /// 让该行回到 `Queued` 由下个周期重新执行。
    ///
    /// 结果未生效（抢占丢失或最终释放）时返回 None。
    pub async fn settle(&self, report: ExecutionReport) -> Option<AppliedOutcome> {
        let (kind, id) = (report.ticker.kind, report.ticker.id);
        let mut delay = self.writeback_backoff;

        for attempt in 1..=WRITEBACK_ATTEMPTS {
            match self.apply(report.clone()).await {
                Ok(applied) => return applied,
                Err(e) if attempt < WRITEBACK_ATTEMPTS => {
                    warn!(
                        "Ticker {} 结果写回失败 (第 {} 次)，{:?} 后重试: {}",
                        id, attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => error!("Ticker {} 结果写回失败，放弃写回: {}", id, e),
            }
        }

        match self.store.release(kind, id, &self.node_id).await {
            Ok(true) => {
                warn!("Ticker {} 已释放回队列，将在下个周期重新执行", id);
                self.metrics.record_writeback_released();
            }
            Ok(false) => debug!("Ticker {} 已不由本节点持有，无需释放", id),
            Err(e) => error!("Ticker {} 释放失败，等待本节点失效后由其他节点回收: {}", id, e),
        }
        None
    }

    /// 写回一次结果；抢占已丢失时返回 `Ok(None)`
    pub async fn apply(&self, report: ExecutionReport) -> SchedulerResult<Option<AppliedOutcome>> {
        let ExecutionReport {
            ticker,
            outcome,
            started_at,
            elapsed_ms,
        } = report;

        let status = match &outcome {
            ExecutionOutcome::Failed { message } => {
                let completion =
                    TickerCompletion::failed(started_at, message.clone()).with_elapsed(elapsed_ms);
                match self
                    .retry_service
                    .handle_failed_ticker(&ticker, completion)
                    .await?
                {
                    RetryDecision::Retry {
                        next_due, attempt, ..
                    } => {
                        StructuredLogger::log_ticker_retry_scheduled(
                            ticker.kind,
                            ticker.id,
                            &ticker.function,
                            attempt,
                            ticker.retries,
                            next_due,
                            message,
                        );
                        self.metrics.record_retry(&ticker.function);
                        return Ok(Some(AppliedOutcome {
                            status: TickerStatus::Queued,
                            next_due: Some(next_due),
                            children_queued: 0,
                        }));
                    }
                    RetryDecision::Exhausted => TickerStatus::Failed,
                    RetryDecision::ClaimLost => {
                        return Ok(self.claim_lost(ticker.kind, ticker.id));
                    }
                }
            }
            other => {
                let status = other.terminal_status().unwrap_or(TickerStatus::Failed);
                let completion = match other {
                    ExecutionOutcome::Succeeded { .. } => match started_at {
                        Some(at) => TickerCompletion::executed(at, elapsed_ms),
                        None => TickerCompletion::default(),
                    },
                    ExecutionOutcome::Skipped { reason } => TickerCompletion::skipped(reason.clone()),
                    _ => TickerCompletion::failed(started_at, other.detail().unwrap_or_default())
                        .with_elapsed(elapsed_ms),
                };
                if !self
                    .store
                    .set_terminal(ticker.kind, ticker.id, &self.node_id, status, completion)
                    .await?
                {
                    return Ok(self.claim_lost(ticker.kind, ticker.id));
                }
                status
            }
        };

        StructuredLogger::log_ticker_completed(
            ticker.kind,
            ticker.id,
            &ticker.function,
            status,
            elapsed_ms,
            outcome.detail().as_deref(),
        );
        self.metrics
            .record_execution(ticker.kind, status, elapsed_ms as f64 / 1000.0);

        let children_queued = if ticker.kind == TickerKind::Time {
            match self
                .dependency_checker
                .on_parent_completed(ticker.id, status)
                .await
            {
                Ok(children) => children.len(),
                Err(e) => {
                    warn!("Ticker {} 的子任务触发失败: {}", ticker.id, e);
                    0
                }
            }
        } else {
            0
        };

        debug!("Ticker {} 结果已落库: {}", ticker.id, status);
        Ok(Some(AppliedOutcome {
            status,
            next_due: None,
            children_queued,
        }))
    }

    fn claim_lost(&self, kind: TickerKind, id: Uuid) -> Option<AppliedOutcome> {
        StructuredLogger::log_claim_lost(kind, id, &self.node_id);
        self.metrics.record_claim_lost();
        None
    }
}
