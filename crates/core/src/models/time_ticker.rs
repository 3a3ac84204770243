use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RunCondition, TickerPriority, TickerRequest, TickerStatus};

/// 一次性定时任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeTicker {
    pub id: Uuid,
    pub function: String,
    pub description: Option<String>,
    pub init_identifier: Option<String>,
    pub status: TickerStatus,
    pub priority: TickerPriority,
    pub request: Option<TickerRequest>,
    /// 最大重试次数
    pub retries: i32,
    /// 已经发生的重试次数
    pub retry_count: i32,
    /// 退避间隔（秒），下标为重试序号
    pub retry_intervals: Vec<i64>,
    pub execution_time: DateTime<Utc>,
    /// 下一次可被调度的时间，重试时后移
    pub due_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub parent_id: Option<Uuid>,
    pub run_condition: Option<RunCondition>,
    pub batch_parent: Option<Uuid>,
    pub executed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub exception_message: Option<String>,
    pub skipped_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeTicker {
    pub fn new(function: impl Into<String>, execution_time: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            function: function.into(),
            description: None,
            init_identifier: None,
            status: TickerStatus::Idle,
            priority: TickerPriority::Normal,
            request: None,
            retries: 0,
            retry_count: 0,
            retry_intervals: Vec::new(),
            execution_time,
            due_at: execution_time,
            locked_by: None,
            locked_at: None,
            parent_id: None,
            run_condition: None,
            batch_parent: None,
            executed_at: None,
            elapsed_ms: None,
            exception_message: None,
            skipped_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_child(&self) -> bool {
        self.parent_id.is_some()
    }

    /// 到期且状态允许执行。子任务在被链式引擎排队前一直保持 Idle，不参与调度。
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let eligible = match self.status {
            TickerStatus::Queued => true,
            TickerStatus::Idle => !self.is_child(),
            _ => false,
        };
        eligible && self.due_at <= now
    }

    /// 用 `update` 覆盖可编辑字段；状态、锁与执行结果保持不变。
    /// 尚未重试过时 `due_at` 跟随新的执行时间。
    pub fn apply_edit(&mut self, update: &TimeTicker, now: DateTime<Utc>) {
        if update.execution_time != self.execution_time && self.retry_count == 0 {
            self.due_at = update.execution_time;
        }
        self.function = update.function.clone();
        self.description = update.description.clone();
        self.init_identifier = update.init_identifier.clone();
        self.priority = update.priority;
        self.request = update.request.clone();
        self.retries = update.retries;
        self.retry_intervals = update.retry_intervals.clone();
        self.execution_time = update.execution_time;
        self.parent_id = update.parent_id;
        self.run_condition = update.run_condition;
        self.batch_parent = update.batch_parent;
        self.updated_at = now;
    }
}

/// 创建一次性任务的请求，子任务随父任务一起创建
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewTimeTicker {
    pub function: String,
    pub execution_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub init_identifier: Option<String>,
    pub priority: TickerPriority,
    pub request: Option<TickerRequest>,
    pub retries: i32,
    pub retry_intervals: Vec<i64>,
    /// 挂到已存在的父任务下
    pub parent_id: Option<Uuid>,
    pub run_condition: Option<RunCondition>,
    pub batch_parent: Option<Uuid>,
    pub children: Vec<NewTimeTicker>,
}

impl NewTimeTicker {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, execution_time: DateTime<Utc>) -> Self {
        self.execution_time = Some(execution_time);
        self
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

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn under_parent(mut self, parent_id: Uuid, run_condition: RunCondition) -> Self {
        self.parent_id = Some(parent_id);
        self.run_condition = Some(run_condition);
        self
    }

    pub fn in_batch(mut self, batch_parent: Uuid) -> Self {
        self.batch_parent = Some(batch_parent);
        self
    }

    pub fn with_child(mut self, run_condition: RunCondition, mut child: NewTimeTicker) -> Self {
        child.run_condition = Some(run_condition);
        self.children.push(child);
        self
    }

    /// 子树的最大深度，自身为 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_child_is_never_due_while_idle() {
        let now = Utc::now();
        let mut ticker = TimeTicker::new("cleanup", now - Duration::seconds(5));
        assert!(ticker.is_due(now));

        ticker.parent_id = Some(Uuid::new_v4());
        assert!(!ticker.is_due(now));

        ticker.status = TickerStatus::Queued;
        assert!(ticker.is_due(now));
    }

    #[test]
    fn test_future_ticker_not_due() {
        let now = Utc::now();
        let ticker = TimeTicker::new("cleanup", now + Duration::seconds(5));
        assert!(!ticker.is_due(now));
        assert!(ticker.is_due(now + Duration::seconds(5)));
    }

    #[test]
    fn test_apply_edit_keeps_bookkeeping() {
        let now = Utc::now();
        let mut stored = TimeTicker::new("job", now);
        stored.status = TickerStatus::Queued;
        stored.locked_by = Some("node-a".to_string());
        stored.exception_message = Some("boom".to_string());

        let mut update = stored.clone();
        update.status = TickerStatus::Idle;
        update.locked_by = None;
        update.exception_message = None;
        update.retries = 3;
        update.execution_time = now + Duration::minutes(5);

        stored.apply_edit(&update, now);
        assert_eq!(stored.status, TickerStatus::Queued);
        assert_eq!(stored.locked_by.as_deref(), Some("node-a"));
        assert_eq!(stored.exception_message.as_deref(), Some("boom"));
        assert_eq!(stored.retries, 3);
        assert_eq!(stored.due_at, update.execution_time);
    }

    #[test]
    fn test_apply_edit_keeps_retry_due_at() {
        let now = Utc::now();
        let mut stored = TimeTicker::new("job", now);
        stored.retry_count = 1;
        stored.due_at = now + Duration::seconds(30);

        let mut update = stored.clone();
        update.execution_time = now + Duration::minutes(5);
        stored.apply_edit(&update, now);
        assert_eq!(stored.due_at, now + Duration::seconds(30));
        assert_eq!(stored.execution_time, update.execution_time);
    }

    #[test]
    fn test_new_time_ticker_depth() {
        let leaf = NewTimeTicker::new("c");
        let middle = NewTimeTicker::new("b").with_child(RunCondition::OnSuccess, leaf);
        let root = NewTimeTicker::new("a")
            .with_child(RunCondition::OnFailure, NewTimeTicker::new("x"))
            .with_child(RunCondition::OnSuccess, middle);
        assert_eq!(root.depth(), 3);
        assert_eq!(root.children[1].run_condition, Some(RunCondition::OnSuccess));
    }
}
