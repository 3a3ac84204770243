//! Test data builders for creating test entities
//!
//! Builders start from sensible defaults so tests only spell out the fields
//! they care about.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use ticker_core::models::{
    CronTicker, DueTicker, RunCondition, TickerPriority, TickerRequest, TickerStatus, TimeTicker,
};

/// Builder for persisted [`TimeTicker`] rows
pub struct TimeTickerBuilder {
    ticker: TimeTicker,
}

impl TimeTickerBuilder {
    /// Due one second in the past, so it is immediately eligible
    pub fn new(function: &str) -> Self {
        Self {
            ticker: TimeTicker::new(function, Utc::now() - Duration::seconds(1)),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.ticker.id = id;
        self
    }

    pub fn at(mut self, execution_time: DateTime<Utc>) -> Self {
        self.ticker.execution_time = execution_time;
        self.ticker.due_at = execution_time;
        self
    }

    pub fn due_in(self, offset: Duration) -> Self {
        self.at(Utc::now() + offset)
    }

    pub fn with_status(mut self, status: TickerStatus) -> Self {
        self.ticker.status = status;
        self
    }

    pub fn with_priority(mut self, priority: TickerPriority) -> Self {
        self.ticker.priority = priority;
        self
    }

    pub fn with_retries(mut self, retries: i32, retry_intervals: Vec<i64>) -> Self {
        self.ticker.retries = retries;
        self.ticker.retry_intervals = retry_intervals;
        self
    }

    pub fn with_request<T: Serialize>(mut self, payload: &T) -> Self {
        self.ticker.request =
            Some(TickerRequest::encode(payload).expect("test payload must serialize"));
        self
    }

    pub fn child_of(mut self, parent_id: Uuid, run_condition: RunCondition) -> Self {
        self.ticker.parent_id = Some(parent_id);
        self.ticker.run_condition = Some(run_condition);
        self
    }

    pub fn in_batch(mut self, batch_parent: Uuid) -> Self {
        self.ticker.batch_parent = Some(batch_parent);
        self
    }

    pub fn locked_by(mut self, node_id: &str) -> Self {
        self.ticker.status = TickerStatus::InProgress;
        self.ticker.locked_by = Some(node_id.to_string());
        self.ticker.locked_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> TimeTicker {
        self.ticker
    }

    /// The row as the dispatcher would see it after a claim
    pub fn build_due(self) -> DueTicker {
        DueTicker::from_time_ticker(&self.ticker)
    }
}

/// Builder for [`CronTicker`] definitions
pub struct CronTickerBuilder {
    ticker: CronTicker,
}

impl CronTickerBuilder {
    pub fn new(function: &str, expression: &str) -> Self {
        Self {
            ticker: CronTicker::new(function, expression),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.ticker.id = id;
        self
    }

    pub fn with_priority(mut self, priority: TickerPriority) -> Self {
        self.ticker.priority = priority;
        self
    }

    pub fn with_retries(mut self, retries: i32, retry_intervals: Vec<i64>) -> Self {
        self.ticker.retries = retries;
        self.ticker.retry_intervals = retry_intervals;
        self
    }

    /// Occurrences are only materialised for boundaries after creation
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.ticker.created_at = created_at;
        self.ticker.updated_at = created_at;
        self
    }

    pub fn build(self) -> CronTicker {
        self.ticker
    }
}
