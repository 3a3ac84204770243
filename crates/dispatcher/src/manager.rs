use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use ticker_core::{
    clock::Clock,
    models::{
        CronTicker, CronTickerOccurrence, NewCronTicker, NewTimeTicker, OperationResult,
        TickerKind, TickerStatus, TimeTicker,
    },
    traits::TickerStore,
    SchedulerError, SchedulerResult,
};
use ticker_worker::TickerExecutionManager;

use crate::cron_utils::CronScheduler;
use crate::dependency_checker::DependencyCheckService;

/// 调度 API：一次性任务与周期任务的增删改、取消与查询
///
/// 参数校验失败和记录不存在放在 [`OperationResult::exception`] 里返回，
/// 存储层的意外错误以 `Err` 抛出。
pub struct TickerManager {
    store: Arc<dyn TickerStore>,
    executor: Arc<TickerExecutionManager>,
    dependency_checker: Arc<dyn DependencyCheckService>,
    clock: Arc<dyn Clock>,
}

impl TickerManager {
    pub fn new(
        store: Arc<dyn TickerStore>,
        executor: Arc<TickerExecutionManager>,
        dependency_checker: Arc<dyn DependencyCheckService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            executor,
            dependency_checker,
            clock,
        }
    }

    // 一次性任务

    /// 创建一次性任务；嵌套的子任务展开为独立的行，返回包括子任务在内的全部行
    pub async fn add_time_ticker(
        &self,
        spec: NewTimeTicker,
    ) -> SchedulerResult<OperationResult<Vec<TimeTicker>>> {
        self.add_time_tickers(vec![spec]).await
    }

    /// 批量创建；任意一个校验失败则整批都不写入
    pub async fn add_time_tickers(
        &self,
        specs: Vec<NewTimeTicker>,
    ) -> SchedulerResult<OperationResult<Vec<TimeTicker>>> {
        let record =
            into_operation_result(self.insert_time_tickers(specs).await, |rows| rows.len() as u64)?;
        if record.is_succeeded {
            info!("创建了 {} 个一次性任务", record.affected_rows);
        }
        Ok(record)
    }

    async fn insert_time_tickers(
        &self,
        specs: Vec<NewTimeTicker>,
    ) -> SchedulerResult<Vec<TimeTicker>> {
        let now = self.clock.now();
        let mut rows = Vec::new();
        for spec in &specs {
            self.validate_time_spec(spec, spec.parent_id.is_some())?;
            if let Some(parent_id) = spec.parent_id {
                self.store
                    .get_time_ticker(parent_id)
                    .await?
                    .ok_or_else(|| SchedulerError::ticker_not_found(parent_id))?;
            }
            self.dependency_checker
                .validate_new_chain(spec.parent_id, spec)
                .await?;
            expand_time_ticker(spec, None, now, &mut rows);
        }
        self.store.add_time_tickers(rows).await
    }

    pub async fn update_time_ticker(
        &self,
        ticker: TimeTicker,
    ) -> SchedulerResult<OperationResult<TimeTicker>> {
        let result = self.update_time_tickers(vec![ticker]).await?;
        Ok(result.map(|mut rows| rows.remove(0)))
    }

    /// 更新可编辑字段；执行中的任务不允许修改，簿记字段保持存储中的值
    pub async fn update_time_tickers(
        &self,
        tickers: Vec<TimeTicker>,
    ) -> SchedulerResult<OperationResult<Vec<TimeTicker>>> {
        into_operation_result(self.edit_time_tickers(tickers).await, |rows| {
            rows.len() as u64
        })
    }

    async fn edit_time_tickers(
        &self,
        tickers: Vec<TimeTicker>,
    ) -> SchedulerResult<Vec<TimeTicker>> {
        for ticker in &tickers {
            let current = self
                .store
                .get_time_ticker(ticker.id)
                .await?
                .ok_or_else(|| SchedulerError::ticker_not_found(ticker.id))?;
            if current.status == TickerStatus::InProgress {
                return Err(SchedulerError::validation(format!(
                    "ticker {} is in progress and cannot be updated",
                    ticker.id
                )));
            }
            self.validate_function(&ticker.function)?;
            validate_retries(ticker.retries, &ticker.retry_intervals)?;
            if ticker.parent_id.is_some() && ticker.run_condition.is_none() {
                return Err(SchedulerError::validation(
                    "run_condition is required for a child ticker",
                ));
            }
            if ticker.parent_id != current.parent_id {
                self.dependency_checker
                    .validate_reparent(ticker.id, ticker.parent_id)
                    .await?;
            }
        }
        self.store.update_time_tickers(tickers).await
    }

    pub async fn delete_time_ticker(&self, id: Uuid) -> SchedulerResult<OperationResult<u64>> {
        self.delete_time_tickers(&[id]).await
    }

    /// 删除并级联删除子任务；在本节点运行中的任务会先收到取消信号
    pub async fn delete_time_tickers(&self, ids: &[Uuid]) -> SchedulerResult<OperationResult<u64>> {
        for id in ids {
            self.executor.cancel(*id).await;
        }
        let result = match self.store.delete_time_tickers(ids).await {
            Ok(0) if !ids.is_empty() => Err(SchedulerError::ticker_not_found(ids[0])),
            other => other,
        };
        into_operation_result(result, |deleted| *deleted)
    }

    pub async fn get_time_ticker(&self, id: Uuid) -> SchedulerResult<Option<TimeTicker>> {
        self.store.get_time_ticker(id).await
    }

    pub async fn children_of(&self, parent_id: Uuid) -> SchedulerResult<Vec<TimeTicker>> {
        self.store.children_of(parent_id).await
    }

    pub async fn find_by_batch(&self, batch_parent: Uuid) -> SchedulerResult<Vec<TimeTicker>> {
        self.store.find_by_batch(batch_parent).await
    }

    // 周期任务

    pub async fn add_cron_ticker(
        &self,
        spec: NewCronTicker,
    ) -> SchedulerResult<OperationResult<CronTicker>> {
        let result = self.add_cron_tickers(vec![spec]).await?;
        Ok(result.map(|mut rows| rows.remove(0)))
    }

    pub async fn add_cron_tickers(
        &self,
        specs: Vec<NewCronTicker>,
    ) -> SchedulerResult<OperationResult<Vec<CronTicker>>> {
        into_operation_result(self.insert_cron_tickers(specs).await, |rows| {
            rows.len() as u64
        })
    }

    async fn insert_cron_tickers(
        &self,
        specs: Vec<NewCronTicker>,
    ) -> SchedulerResult<Vec<CronTicker>> {
        let now = self.clock.now();
        let mut rows = Vec::with_capacity(specs.len());
        for spec in specs {
            let schedule = CronScheduler::new(&spec.expression)?;
            self.validate_function(&spec.function)?;
            validate_retries(spec.retries, &spec.retry_intervals)?;

            let mut cron = CronTicker::new(spec.function, spec.expression);
            cron.description = spec.description;
            cron.init_identifier = spec.init_identifier;
            cron.priority = spec.priority;
            cron.request = spec.request;
            cron.retries = spec.retries;
            cron.retry_intervals = spec.retry_intervals;
            cron.next_occurrence = schedule.next_occurrence(now);
            cron.created_at = now;
            cron.updated_at = now;
            rows.push(cron);
        }
        self.store.add_cron_tickers(rows).await
    }

    pub async fn update_cron_ticker(
        &self,
        ticker: CronTicker,
    ) -> SchedulerResult<OperationResult<CronTicker>> {
        let result = self.update_cron_tickers(vec![ticker]).await?;
        Ok(result.map(|mut rows| rows.remove(0)))
    }

    /// 更新周期任务；表达式变化时重新计算 `next_occurrence`
    pub async fn update_cron_tickers(
        &self,
        tickers: Vec<CronTicker>,
    ) -> SchedulerResult<OperationResult<Vec<CronTicker>>> {
        into_operation_result(self.edit_cron_tickers(tickers).await, |rows| {
            rows.len() as u64
        })
    }

    async fn edit_cron_tickers(
        &self,
        mut tickers: Vec<CronTicker>,
    ) -> SchedulerResult<Vec<CronTicker>> {
        let now = self.clock.now();
        for ticker in &mut tickers {
            let current = self
                .store
                .get_cron_ticker(ticker.id)
                .await?
                .ok_or_else(|| SchedulerError::ticker_not_found(ticker.id))?;
            let schedule = CronScheduler::new(&ticker.expression)?;
            self.validate_function(&ticker.function)?;
            validate_retries(ticker.retries, &ticker.retry_intervals)?;

            if ticker.expression != current.expression {
                debug!(
                    "CRON任务 {} 的表达式从 {} 改为 {}",
                    ticker.id, current.expression, ticker.expression
                );
            }
            ticker.next_occurrence = schedule.next_occurrence(now);
        }
        self.store.update_cron_tickers(tickers).await
    }

    pub async fn delete_cron_ticker(&self, id: Uuid) -> SchedulerResult<OperationResult<u64>> {
        self.delete_cron_tickers(&[id]).await
    }

    /// 删除周期任务及其全部 occurrence
    pub async fn delete_cron_tickers(&self, ids: &[Uuid]) -> SchedulerResult<OperationResult<u64>> {
        let result = match self.store.delete_cron_tickers(ids).await {
            Ok(0) if !ids.is_empty() => Err(SchedulerError::ticker_not_found(ids[0])),
            other => other,
        };
        into_operation_result(result, |deleted| *deleted)
    }

    pub async fn get_cron_ticker(&self, id: Uuid) -> SchedulerResult<Option<CronTicker>> {
        self.store.get_cron_ticker(id).await
    }

    pub async fn list_cron_tickers(&self) -> SchedulerResult<Vec<CronTicker>> {
        self.store.list_cron_tickers().await
    }

    pub async fn occurrences_of(
        &self,
        cron_ticker_id: Uuid,
    ) -> SchedulerResult<Vec<CronTickerOccurrence>> {
        self.store.occurrences_of(cron_ticker_id).await
    }

    /// 预览表达式接下来的 `count` 个边界
    pub fn preview_cron(
        &self,
        expression: &str,
        count: usize,
    ) -> SchedulerResult<OperationResult<Vec<DateTime<Utc>>>> {
        let result =
            CronScheduler::new(expression).map(|s| s.upcoming_times(self.clock.now(), count));
        into_operation_result(result, |_| 0)
    }

    /// 只校验表达式，不创建任务
    pub fn validate_cron(&self, expression: &str) -> SchedulerResult<OperationResult<()>> {
        into_operation_result(CronScheduler::validate_cron_expression(expression), |_| 0)
    }

    // 取消

    /// 请求取消
    ///
    /// 在本节点运行中的任务收到协作式取消信号，返回 `InProgress`；
    /// 尚未开始的任务（`Idle`/`Queued`）直接写入 `Cancelled` 并触发链式子任务。
    pub async fn cancel(
        &self,
        kind: TickerKind,
        id: Uuid,
    ) -> SchedulerResult<OperationResult<TickerStatus>> {
        if self.executor.cancel(id).await {
            return Ok(OperationResult::success(TickerStatus::InProgress, 1));
        }
        into_operation_result(self.cancel_pending(kind, id).await, |_| 1)
    }

    async fn cancel_pending(&self, kind: TickerKind, id: Uuid) -> SchedulerResult<TickerStatus> {
        for from in [TickerStatus::Idle, TickerStatus::Queued] {
            if self
                .store
                .transition(kind, id, from, TickerStatus::Cancelled)
                .await?
            {
                info!("Ticker {} 已取消 (原状态 {})", id, from);
                if kind == TickerKind::Time {
                    self.dependency_checker
                        .on_parent_completed(id, TickerStatus::Cancelled)
                        .await?;
                }
                return Ok(TickerStatus::Cancelled);
            }
        }
        let status = match kind {
            TickerKind::Time => self.store.get_time_ticker(id).await?.map(|t| t.status),
            TickerKind::CronOccurrence => {
                self.store.get_occurrence(id).await?.map(|o| o.status)
            }
        };
        match status {
            None => Err(SchedulerError::ticker_not_found(id)),
            Some(status) => Err(SchedulerError::validation(format!(
                "ticker {id} cannot be cancelled in status {status}"
            ))),
        }
    }

    fn validate_function(&self, function: &str) -> SchedulerResult<()> {
        if function.trim().is_empty() {
            return Err(SchedulerError::validation("function is required"));
        }
        if !self.executor.registry().contains(function) {
            return Err(SchedulerError::FunctionNotFound {
                name: function.to_string(),
            });
        }
        Ok(())
    }

    fn validate_time_spec(&self, spec: &NewTimeTicker, is_child: bool) -> SchedulerResult<()> {
        self.validate_function(&spec.function)?;
        validate_retries(spec.retries, &spec.retry_intervals)?;
        if is_child && spec.run_condition.is_none() {
            return Err(SchedulerError::validation(
                "run_condition is required for a child ticker",
            ));
        }
        for child in &spec.children {
            self.validate_time_spec(child, true)?;
        }
        Ok(())
    }
}

fn validate_retries(retries: i32, intervals: &[i64]) -> SchedulerResult<()> {
    if retries < 0 {
        return Err(SchedulerError::validation("retries must not be negative"));
    }
    if intervals.iter().any(|s| *s < 0) {
        return Err(SchedulerError::validation(
            "retry_intervals must not contain negative values",
        ));
    }
    Ok(())
}

/// 把嵌套的创建请求展开为行，父任务在前。子任务未指定执行时间时沿用父任务的。
fn expand_time_ticker(
    spec: &NewTimeTicker,
    parent: Option<&TimeTicker>,
    now: DateTime<Utc>,
    rows: &mut Vec<TimeTicker>,
) {
    let execution_time = spec
        .execution_time
        .or(parent.map(|p| p.execution_time))
        .unwrap_or(now);

    let mut ticker = TimeTicker::new(spec.function.clone(), execution_time);
    ticker.description = spec.description.clone();
    ticker.init_identifier = spec.init_identifier.clone();
    ticker.priority = spec.priority;
    ticker.request = spec.request.clone();
    ticker.retries = spec.retries;
    ticker.retry_intervals = spec.retry_intervals.clone();
    ticker.parent_id = parent.map(|p| p.id).or(spec.parent_id);
    ticker.run_condition = spec.run_condition;
    ticker.batch_parent = spec.batch_parent;
    ticker.created_at = now;
    ticker.updated_at = now;

    rows.push(ticker.clone());
    for child in &spec.children {
        expand_time_ticker(child, Some(&ticker), now, rows);
    }
}

/// 可预期的失败转成记录，其余错误原样抛出
fn into_operation_result<T>(
    result: SchedulerResult<T>,
    affected: impl FnOnce(&T) -> u64,
) -> SchedulerResult<OperationResult<T>> {
    match result {
        Ok(value) => {
            let rows = affected(&value);
            Ok(OperationResult::success(value, rows))
        }
        Err(e) if e.is_validation() || matches!(e, SchedulerError::TickerNotFound { .. }) => {
            debug!("调度请求被拒绝: {}", e);
            Ok(OperationResult::failure(e))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_children_inherit_execution_time() {
        let now = Utc::now();
        let at = now + Duration::minutes(10);
        let spec = NewTimeTicker::new("parent").at(at).with_child(
            ticker_core::models::RunCondition::OnSuccess,
            NewTimeTicker::new("child"),
        );

        let mut rows = Vec::new();
        expand_time_ticker(&spec, None, now, &mut rows);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].parent_id, Some(rows[0].id));
        assert_eq!(rows[1].execution_time, at);
        assert_eq!(rows[1].status, TickerStatus::Idle);
    }

    #[test]
    fn test_store_errors_are_not_wrapped() {
        let result: SchedulerResult<u32> = Err(SchedulerError::store("connection reset"));
        assert!(into_operation_result(result, |_| 1).is_err());

        let result: SchedulerResult<u32> = Err(SchedulerError::CircularChain);
        let record = into_operation_result(result, |_| 1).unwrap();
        assert!(!record.is_succeeded);
    }

    #[test]
    fn test_negative_retry_values_rejected() {
        assert!(validate_retries(-1, &[]).is_err());
        assert!(validate_retries(2, &[10, -5]).is_err());
        assert!(validate_retries(2, &[]).is_ok());
    }
}
