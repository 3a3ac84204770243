use serde::{Deserialize, Serialize};

/// Ticker 生命周期状态
///
/// ```text
/// Idle → Queued → InProgress → Done | DueDone | Failed | Cancelled | Skipped
///                     ↓
///                  Queued (重试 / 失效节点回收)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TickerStatus {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "DUE_DONE")]
    DueDone,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

impl TickerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TickerStatus::Done
                | TickerStatus::DueDone
                | TickerStatus::Failed
                | TickerStatus::Cancelled
                | TickerStatus::Skipped
        )
    }

    /// 可以被原子抢占的状态
    pub fn is_claimable(&self) -> bool {
        matches!(self, TickerStatus::Idle | TickerStatus::Queued)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, TickerStatus::Done | TickerStatus::DueDone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TickerStatus::Idle => "IDLE",
            TickerStatus::Queued => "QUEUED",
            TickerStatus::InProgress => "IN_PROGRESS",
            TickerStatus::Done => "DONE",
            TickerStatus::DueDone => "DUE_DONE",
            TickerStatus::Failed => "FAILED",
            TickerStatus::Cancelled => "CANCELLED",
            TickerStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for TickerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 执行优先级
///
/// `LongRunning` 不参与排序，走独立的不限并发执行通道。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TickerPriority {
    #[serde(rename = "HIGH")]
    High,
    #[default]
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "LONG_RUNNING")]
    LongRunning,
}

impl TickerPriority {
    /// 数值越小越先执行
    pub fn rank(&self) -> u8 {
        match self {
            TickerPriority::High => 0,
            TickerPriority::Normal => 1,
            TickerPriority::Low => 2,
            TickerPriority::LongRunning => 3,
        }
    }

    pub fn is_long_running(&self) -> bool {
        matches!(self, TickerPriority::LongRunning)
    }
}

/// 子任务的触发条件，基于父任务的状态求值
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RunCondition {
    #[serde(rename = "ON_SUCCESS")]
    OnSuccess,
    #[serde(rename = "ON_FAILURE")]
    OnFailure,
    #[serde(rename = "ON_CANCELLED")]
    OnCancelled,
    #[serde(rename = "ON_FAILURE_OR_CANCELLED")]
    OnFailureOrCancelled,
    #[serde(rename = "ON_ANY_COMPLETED_STATUS")]
    OnAnyCompletedStatus,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
}

impl RunCondition {
    /// 父任务进入 `parent_status` 时该条件是否满足
    pub fn is_satisfied_by(&self, parent_status: TickerStatus) -> bool {
        match self {
            RunCondition::OnSuccess => parent_status.is_successful(),
            RunCondition::OnFailure => parent_status == TickerStatus::Failed,
            RunCondition::OnCancelled => parent_status == TickerStatus::Cancelled,
            RunCondition::OnFailureOrCancelled => matches!(
                parent_status,
                TickerStatus::Failed | TickerStatus::Cancelled
            ),
            RunCondition::OnAnyCompletedStatus => parent_status.is_terminal(),
            RunCondition::InProgress => parent_status == TickerStatus::InProgress,
        }
    }

    /// 在父任务开始执行时求值，而不是在父任务结束时
    pub fn fires_on_start(&self) -> bool {
        matches!(self, RunCondition::InProgress)
    }
}

/// 可被抢占执行的行类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TickerKind {
    #[serde(rename = "TIME")]
    Time,
    #[serde(rename = "CRON_OCCURRENCE")]
    CronOccurrence,
}

impl std::fmt::Display for TickerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickerKind::Time => f.write_str("time"),
            TickerKind::CronOccurrence => f.write_str("cron"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        for status in [
            TickerStatus::Done,
            TickerStatus::DueDone,
            TickerStatus::Failed,
            TickerStatus::Cancelled,
            TickerStatus::Skipped,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
            assert!(!status.is_claimable());
        }
        assert!(!TickerStatus::InProgress.is_terminal());
        assert!(TickerStatus::Idle.is_claimable());
        assert!(TickerStatus::Queued.is_claimable());
    }

    #[test]
    fn test_run_condition_matrix() {
        use RunCondition::*;
        use TickerStatus::*;

        assert!(OnSuccess.is_satisfied_by(Done));
        assert!(OnSuccess.is_satisfied_by(DueDone));
        assert!(!OnSuccess.is_satisfied_by(Failed));

        assert!(OnFailure.is_satisfied_by(Failed));
        assert!(!OnFailure.is_satisfied_by(Cancelled));

        assert!(OnCancelled.is_satisfied_by(Cancelled));
        assert!(OnFailureOrCancelled.is_satisfied_by(Failed));
        assert!(OnFailureOrCancelled.is_satisfied_by(Cancelled));
        assert!(!OnFailureOrCancelled.is_satisfied_by(Done));

        assert!(OnAnyCompletedStatus.is_satisfied_by(Skipped));
        assert!(!OnAnyCompletedStatus.is_satisfied_by(TickerStatus::InProgress));

        assert!(RunCondition::InProgress.is_satisfied_by(TickerStatus::InProgress));
        assert!(!RunCondition::InProgress.is_satisfied_by(Done));
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(TickerPriority::High.rank() < TickerPriority::Normal.rank());
        assert!(TickerPriority::Normal.rank() < TickerPriority::Low.rank());
        assert_eq!(TickerPriority::default(), TickerPriority::Normal);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TickerStatus::DueDone).unwrap();
        assert_eq!(json, "\"DUE_DONE\"");
        let status: TickerStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(status, TickerStatus::InProgress);
    }
}
