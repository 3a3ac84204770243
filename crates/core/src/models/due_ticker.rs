use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    CronTicker, CronTickerOccurrence, TickerKind, TickerPriority, TickerRequest, TickerStatus,
    TimeTicker,
};

/// 调度器看到的待执行行，time ticker 和 cron occurrence 统一成同一形态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DueTicker {
    pub kind: TickerKind,
    pub id: Uuid,
    pub cron_ticker_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub function: String,
    pub priority: TickerPriority,
    pub status: TickerStatus,
    pub request: Option<TickerRequest>,
    pub retries: i32,
    pub retry_count: i32,
    pub retry_intervals: Vec<i64>,
    pub execution_time: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    /// 同一 CRON 任务更新的边界已到期时，由调度器填入；不持久化
    #[serde(skip)]
    pub superseded_by: Option<DateTime<Utc>>,
}

impl DueTicker {
    pub fn from_time_ticker(ticker: &TimeTicker) -> Self {
        Self {
            kind: TickerKind::Time,
            id: ticker.id,
            cron_ticker_id: None,
            parent_id: ticker.parent_id,
            function: ticker.function.clone(),
            priority: ticker.priority,
            status: ticker.status,
            request: ticker.request.clone(),
            retries: ticker.retries,
            retry_count: ticker.retry_count,
            retry_intervals: ticker.retry_intervals.clone(),
            execution_time: ticker.execution_time,
            due_at: ticker.due_at,
            locked_by: ticker.locked_by.clone(),
            locked_at: ticker.locked_at,
            superseded_by: None,
        }
    }

    pub fn from_occurrence(cron: &CronTicker, occurrence: &CronTickerOccurrence) -> Self {
        Self {
            kind: TickerKind::CronOccurrence,
            id: occurrence.id,
            cron_ticker_id: Some(cron.id),
            parent_id: None,
            function: cron.function.clone(),
            priority: cron.priority,
            status: occurrence.status,
            request: cron.request.clone(),
            retries: cron.retries,
            retry_count: occurrence.retry_count,
            retry_intervals: cron.retry_intervals.clone(),
            execution_time: occurrence.execution_time,
            due_at: occurrence.due_at,
            locked_by: occurrence.locked_by.clone(),
            locked_at: occurrence.locked_at,
            superseded_by: None,
        }
    }

    /// 抢占成功后本地快照的状态
    pub fn mark_claimed(&mut self, node_id: &str, now: DateTime<Utc>) {
        self.status = TickerStatus::InProgress;
        self.locked_by = Some(node_id.to_string());
        self.locked_at = Some(now);
    }
}

/// 写回终态时携带的执行信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerCompletion {
    pub executed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub exception_message: Option<String>,
    pub skipped_reason: Option<String>,
}

impl TickerCompletion {
    pub fn executed(executed_at: DateTime<Utc>, elapsed_ms: i64) -> Self {
        Self {
            executed_at: Some(executed_at),
            elapsed_ms: Some(elapsed_ms),
            ..Default::default()
        }
    }

    pub fn failed(executed_at: Option<DateTime<Utc>>, message: impl Into<String>) -> Self {
        Self {
            executed_at,
            exception_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_elapsed(mut self, elapsed_ms: i64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }
}
