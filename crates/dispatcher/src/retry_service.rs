use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use ticker_core::{
    clock::Clock,
    config::{RetryConfig, RetryIntervalOverflow},
    models::{DueTicker, TickerCompletion, TickerStatus},
    traits::TickerStore,
    SchedulerResult,
};

/// 重试决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 已重新排期；`attempt` 为本次重试的序号（从 1 开始）
    Retry {
        next_due: DateTime<Utc>,
        backoff_seconds: i64,
        attempt: i32,
    },
    /// 重试次数耗尽，已写入 `Failed`
    Exhausted,
    /// 本节点已不再持有该行的抢占，什么也没写
    ClaimLost,
}

/// 重试间隔策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    default_interval_seconds: i64,
    overflow: RetryIntervalOverflow,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            default_interval_seconds: config.default_interval_seconds as i64,
            overflow: config.overflow,
        }
    }

    /// 第 `retry_count` 次失败之后的等待秒数
    pub fn interval_for(&self, intervals: &[i64], retry_count: i32) -> i64 {
        if intervals.is_empty() {
            return self.default_interval_seconds;
        }
        let index = retry_count.max(0) as usize;
        let seconds = match intervals.get(index) {
            Some(seconds) => *seconds,
            None => match self.overflow {
                RetryIntervalOverflow::ReuseLast => intervals[intervals.len() - 1],
                RetryIntervalOverflow::Cycle => intervals[index % intervals.len()],
            },
        };
        seconds.max(0)
    }

    pub fn should_retry(&self, ticker: &DueTicker) -> bool {
        ticker.retry_count < ticker.retries
    }

    pub fn next_due(&self, ticker: &DueTicker, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.should_retry(ticker).then(|| {
            now + Duration::seconds(self.interval_for(&ticker.retry_intervals, ticker.retry_count))
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// 重试服务接口
#[async_trait]
pub trait RetryService: Send + Sync {
    /// 处理失败的 ticker：重新排期或写入终态 `Failed`
    async fn handle_failed_ticker(
        &self,
        ticker: &DueTicker,
        completion: TickerCompletion,
    ) -> SchedulerResult<RetryDecision>;

    /// 计算下次重试时间，不再重试时返回 None
    fn calculate_next_retry_time(&self, ticker: &DueTicker) -> Option<DateTime<Utc>>;
}

/// 重试服务实现
pub struct TickerRetryService {
    node_id: String,
    store: Arc<dyn TickerStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl TickerRetryService {
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<dyn TickerStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl RetryService for TickerRetryService {
    async fn handle_failed_ticker(
        &self,
        ticker: &DueTicker,
        completion: TickerCompletion,
    ) -> SchedulerResult<RetryDecision> {
        let now = self.clock.now();
        match self.policy.next_due(ticker, now) {
            Some(next_due) => {
                let backoff_seconds = (next_due - now).num_seconds();
                if !self
                    .store
                    .reschedule(
                        ticker.kind,
                        ticker.id,
                        &self.node_id,
                        next_due,
                        TickerStatus::Queued,
                        completion.exception_message.clone(),
                    )
                    .await?
                {
                    return Ok(RetryDecision::ClaimLost);
                }
                info!(
                    "Ticker {} 第 {} 次重试安排在 {} ({} 秒后)",
                    ticker.id,
                    ticker.retry_count + 1,
                    next_due,
                    backoff_seconds
                );
                Ok(RetryDecision::Retry {
                    next_due,
                    backoff_seconds,
                    attempt: ticker.retry_count + 1,
                })
            }
            None => {
                debug!(
                    "Ticker {} 已达到最大重试次数 {}，标记为失败",
                    ticker.id, ticker.retries
                );
                if !self
                    .store
                    .set_terminal(
                        ticker.kind,
                        ticker.id,
                        &self.node_id,
                        TickerStatus::Failed,
                        completion,
                    )
                    .await?
                {
                    return Ok(RetryDecision::ClaimLost);
                }
                Ok(RetryDecision::Exhausted)
            }
        }
    }

    fn calculate_next_retry_time(&self, ticker: &DueTicker) -> Option<DateTime<Utc>> {
        self.policy.next_due(ticker, self.clock.now())
    }
}
