//! Ticker 存储接口定义
//!
//! 调度引擎只依赖这里的抽象，不关心数据如何落盘。实现者必须保证：
//!
//! - [`TickerStore::try_claim`] 是存储层面真正的比较并交换：同一行
//!   在任意时刻最多只有一个调用者能把它从 `Idle/Queued` 迁移到 `InProgress`；
//! - [`TickerStore::upsert_occurrence`] 以 `(cron_ticker_id, boundary)` 为键幂等；
//! - 单个状态迁移要么整体生效，要么不生效；
//! - 执行结果的写回只对仍持有抢占的节点生效。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! async fn claim_one(store: &dyn TickerStore, node_id: &str) -> SchedulerResult<()> {
//!     let now = Utc::now();
//!     for due in store.find_due(TickerKind::Time, now).await? {
//!         if store.try_claim(due.kind, due.id, node_id, now).await? {
//!             // 本节点获得执行权
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{
        CronTicker, CronTickerOccurrence, DueTicker, TickerCompletion, TickerKind, TickerStatus,
        TimeTicker,
    },
    SchedulerResult,
};

#[async_trait]
pub trait TickerStore: Send + Sync {
    // 调度原语

    /// 查找 `due_at <= now` 且状态允许执行的行
    async fn find_due(&self, kind: TickerKind, now: DateTime<Utc>)
        -> SchedulerResult<Vec<DueTicker>>;

    /// 原子抢占；仅当本次调用完成了 `Idle/Queued → InProgress` 迁移时返回 true
    async fn try_claim(
        &self,
        kind: TickerKind,
        id: Uuid,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool>;

    /// 放弃抢占：`InProgress → Queued`，清空锁，不计重试次数
    ///
    /// 写回类操作（本方法、[`reschedule`](Self::reschedule)、
    /// [`set_terminal`](Self::set_terminal)）仅当该行仍为 `InProgress`
    /// 且 `locked_by == node_id` 时生效，否则不改动并返回 false。
    async fn release(&self, kind: TickerKind, id: Uuid, node_id: &str) -> SchedulerResult<bool>;

    /// 重新排期：设置新的到期时间和状态，重试次数加一，清空锁，记录失败信息
    async fn reschedule(
        &self,
        kind: TickerKind,
        id: Uuid,
        node_id: &str,
        next_due: DateTime<Utc>,
        status: TickerStatus,
        exception_message: Option<String>,
    ) -> SchedulerResult<bool>;

    /// 写入终态并清空锁
    async fn set_terminal(
        &self,
        kind: TickerKind,
        id: Uuid,
        node_id: &str,
        status: TickerStatus,
        completion: TickerCompletion,
    ) -> SchedulerResult<bool>;

    /// 条件状态迁移：当前状态等于 `from` 时改为 `to`
    async fn transition(
        &self,
        kind: TickerKind,
        id: Uuid,
        from: TickerStatus,
        to: TickerStatus,
    ) -> SchedulerResult<bool>;

    /// 幂等地物化一次 CRON 触发，返回该行以及本次是否新建
    async fn upsert_occurrence(
        &self,
        cron_ticker_id: Uuid,
        boundary: DateTime<Utc>,
    ) -> SchedulerResult<(CronTickerOccurrence, bool)>;

    /// 批量回收：`locked_by = node_id` 且 `InProgress` 的行回到 `Queued`
    async fn reclaim_locked_by(&self, node_id: &str) -> SchedulerResult<u64>;

    async fn find_locked_by(&self, node_id: &str) -> SchedulerResult<Vec<DueTicker>>;

    // 一次性任务管理

    async fn add_time_tickers(&self, tickers: Vec<TimeTicker>) -> SchedulerResult<Vec<TimeTicker>>;

    /// 在写锁内只覆盖可编辑字段（见 [`TimeTicker::apply_edit`]）；
    /// 任意一行此刻处于 `InProgress` 时整批拒绝
    async fn update_time_tickers(
        &self,
        tickers: Vec<TimeTicker>,
    ) -> SchedulerResult<Vec<TimeTicker>>;

    /// 删除并级联删除子任务，返回受影响的行数
    async fn delete_time_tickers(&self, ids: &[Uuid]) -> SchedulerResult<u64>;

    async fn get_time_ticker(&self, id: Uuid) -> SchedulerResult<Option<TimeTicker>>;

    async fn children_of(&self, parent_id: Uuid) -> SchedulerResult<Vec<TimeTicker>>;

    async fn find_by_batch(&self, batch_parent: Uuid) -> SchedulerResult<Vec<TimeTicker>>;

    // 周期任务管理

    async fn add_cron_tickers(&self, tickers: Vec<CronTicker>) -> SchedulerResult<Vec<CronTicker>>;

    /// 只覆盖可编辑字段（见 [`CronTicker::apply_edit`]）
    async fn update_cron_tickers(
        &self,
        tickers: Vec<CronTicker>,
    ) -> SchedulerResult<Vec<CronTicker>>;

    /// 删除并级联删除其 occurrence，返回受影响的行数
    async fn delete_cron_tickers(&self, ids: &[Uuid]) -> SchedulerResult<u64>;

    async fn get_cron_ticker(&self, id: Uuid) -> SchedulerResult<Option<CronTicker>>;

    async fn list_cron_tickers(&self) -> SchedulerResult<Vec<CronTicker>>;

    async fn set_next_occurrence(
        &self,
        cron_ticker_id: Uuid,
        next: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;

    async fn get_occurrence(&self, id: Uuid) -> SchedulerResult<Option<CronTickerOccurrence>>;

    async fn occurrences_of(
        &self,
        cron_ticker_id: Uuid,
    ) -> SchedulerResult<Vec<CronTickerOccurrence>>;
}
