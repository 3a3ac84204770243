use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TickerPriority, TickerRequest, TickerStatus};

/// 周期任务定义，本身不会被执行，执行的是物化出来的 occurrence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronTicker {
    pub id: Uuid,
    pub function: String,
    /// 六段式 CRON 表达式：秒 分 时 日 月 周
    pub expression: String,
    pub description: Option<String>,
    pub init_identifier: Option<String>,
    pub priority: TickerPriority,
    pub request: Option<TickerRequest>,
    pub retries: i32,
    pub retry_intervals: Vec<i64>,
    pub next_occurrence: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CronTicker {
    pub fn new(function: impl Into<String>, expression: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            function: function.into(),
            expression: expression.into(),
            description: None,
            init_identifier: None,
            priority: TickerPriority::Normal,
            request: None,
            retries: 0,
            retry_intervals: Vec::new(),
            next_occurrence: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 用 `update` 覆盖可编辑字段。表达式变化时采用 `update.next_occurrence`，
    /// 否则保留调度器写入的值。
    pub fn apply_edit(&mut self, update: &CronTicker, now: DateTime<Utc>) {
        if update.expression != self.expression {
            self.expression = update.expression.clone();
            self.next_occurrence = update.next_occurrence;
        }
        self.function = update.function.clone();
        self.description = update.description.clone();
        self.init_identifier = update.init_identifier.clone();
        self.priority = update.priority;
        self.request = update.request.clone();
        self.retries = update.retries;
        self.retry_intervals = update.retry_intervals.clone();
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewCronTicker {
    pub function: String,
    pub expression: String,
    pub description: Option<String>,
    pub init_identifier: Option<String>,
    pub priority: TickerPriority,
    pub request: Option<TickerRequest>,
    pub retries: i32,
    pub retry_intervals: Vec<i64>,
}

impl NewCronTicker {
    pub fn new(function: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            expression: expression.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: TickerPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retries(mut self, retries: i32, retry_intervals: Vec<i64>) -> Self {
        self.retries = retries;
        self.retry_intervals = retry_intervals;
        self
    }

    pub fn with_request(mut self, request: TickerRequest) -> Self {
        self.request = Some(request);
        self
    }
}

/// CRON 任务在某个边界时间点的一次物化触发
///
/// (cron_ticker_id, execution_time) 唯一。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronTickerOccurrence {
    pub id: Uuid,
    pub cron_ticker_id: Uuid,
    pub status: TickerStatus,
    /// CRON 边界时间
    pub execution_time: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub retry_count: i32,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub exception_message: Option<String>,
    pub skipped_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CronTickerOccurrence {
    pub fn new(cron_ticker_id: Uuid, boundary: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cron_ticker_id,
            status: TickerStatus::Idle,
            execution_time: boundary,
            due_at: boundary,
            retry_count: 0,
            locked_by: None,
            locked_at: None,
            executed_at: None,
            elapsed_ms: None,
            exception_message: None,
            skipped_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.due_at <= now
    }
}
