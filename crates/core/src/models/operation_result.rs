use crate::SchedulerError;

/// 调度 API 的返回记录
///
/// 可预期的失败（参数校验、记录不存在）放在 `exception` 里返回，
/// 只有存储不可用之类的意外情况才以 `Err` 抛给调用方。
#[derive(Debug, Clone)]
pub struct OperationResult<T> {
    pub is_succeeded: bool,
    pub result: Option<T>,
    pub affected_rows: u64,
    pub exception: Option<SchedulerError>,
}

impl<T> OperationResult<T> {
    pub fn success(result: T, affected_rows: u64) -> Self {
        Self {
            is_succeeded: true,
            result: Some(result),
            affected_rows,
            exception: None,
        }
    }

    pub fn failure(error: SchedulerError) -> Self {
        Self {
            is_succeeded: false,
            result: None,
            affected_rows: 0,
            exception: Some(error),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> OperationResult<U> {
        OperationResult {
            is_succeeded: self.is_succeeded,
            result: self.result.map(f),
            affected_rows: self.affected_rows,
            exception: self.exception,
        }
    }
}
