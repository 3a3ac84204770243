use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use ticker_core::{
    models::{
        CronTicker, CronTickerOccurrence, DueTicker, TickerCompletion, TickerKind, TickerStatus,
        TimeTicker,
    },
    traits::TickerStore,
    SchedulerError, SchedulerResult,
};

/// 内存 Ticker 存储
///
/// 所有表放在同一把读写锁之后，抢占和状态迁移都在写锁内完成比较并交换，
/// 因此同一进程内多个调度器共享一个实例时，语义与真正的共享数据库一致。
/// 适用于嵌入式单进程部署和测试。
#[derive(Debug, Clone, Default)]
pub struct InMemoryTickerStore {
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    time_tickers: HashMap<Uuid, TimeTicker>,
    cron_tickers: HashMap<Uuid, CronTicker>,
    occurrences: HashMap<Uuid, CronTickerOccurrence>,
    /// (cron_ticker_id, boundary) → occurrence id
    occurrence_index: HashMap<(Uuid, DateTime<Utc>), Uuid>,
}

/// 两类可抢占行共享的锁定字段视图
struct LockView<'a> {
    status: &'a mut TickerStatus,
    due_at: &'a mut DateTime<Utc>,
    retry_count: &'a mut i32,
    locked_by: &'a mut Option<String>,
    locked_at: &'a mut Option<DateTime<Utc>>,
    executed_at: &'a mut Option<DateTime<Utc>>,
    elapsed_ms: &'a mut Option<i64>,
    exception_message: &'a mut Option<String>,
    skipped_reason: &'a mut Option<String>,
    updated_at: &'a mut DateTime<Utc>,
    is_child: bool,
}

impl LockView<'_> {
    fn clear_lock(&mut self) {
        *self.locked_by = None;
        *self.locked_at = None;
    }

    fn held_by(&self, node_id: &str) -> bool {
        *self.status == TickerStatus::InProgress && self.locked_by.as_deref() == Some(node_id)
    }
}

impl StoreState {
    fn lock_view(&mut self, kind: TickerKind, id: Uuid) -> Option<LockView<'_>> {
        match kind {
            TickerKind::Time => self.time_tickers.get_mut(&id).map(|t| LockView {
                is_child: t.parent_id.is_some(),
                status: &mut t.status,
                due_at: &mut t.due_at,
                retry_count: &mut t.retry_count,
                locked_by: &mut t.locked_by,
                locked_at: &mut t.locked_at,
                executed_at: &mut t.executed_at,
                elapsed_ms: &mut t.elapsed_ms,
                exception_message: &mut t.exception_message,
                skipped_reason: &mut t.skipped_reason,
                updated_at: &mut t.updated_at,
            }),
            TickerKind::CronOccurrence => self.occurrences.get_mut(&id).map(|o| LockView {
                is_child: false,
                status: &mut o.status,
                due_at: &mut o.due_at,
                retry_count: &mut o.retry_count,
                locked_by: &mut o.locked_by,
                locked_at: &mut o.locked_at,
                executed_at: &mut o.executed_at,
                elapsed_ms: &mut o.elapsed_ms,
                exception_message: &mut o.exception_message,
                skipped_reason: &mut o.skipped_reason,
                updated_at: &mut o.updated_at,
            }),
        }
    }

    fn due_occurrence(&self, occurrence: &CronTickerOccurrence) -> Option<DueTicker> {
        self.cron_tickers
            .get(&occurrence.cron_ticker_id)
            .map(|cron| DueTicker::from_occurrence(cron, occurrence))
    }

    /// 收集一组 time ticker 及其所有后代
    fn collect_descendants(&self, roots: &[Uuid]) -> HashSet<Uuid> {
        let mut collected: HashSet<Uuid> = HashSet::new();
        let mut frontier: Vec<Uuid> = roots
            .iter()
            .copied()
            .filter(|id| self.time_tickers.contains_key(id))
            .collect();

        while let Some(id) = frontier.pop() {
            if !collected.insert(id) {
                continue;
            }
            frontier.extend(
                self.time_tickers
                    .values()
                    .filter(|t| t.parent_id == Some(id))
                    .map(|t| t.id),
            );
        }
        collected
    }
}

impl InMemoryTickerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn time_ticker_count(&self) -> usize {
        self.state.read().await.time_tickers.len()
    }

    pub async fn occurrence_count(&self) -> usize {
        self.state.read().await.occurrences.len()
    }
}

#[async_trait]
impl TickerStore for InMemoryTickerStore {
    async fn find_due(
        &self,
        kind: TickerKind,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<DueTicker>> {
        let state = self.state.read().await;
        let mut due: Vec<DueTicker> = match kind {
            TickerKind::Time => state
                .time_tickers
                .values()
                .filter(|t| t.is_due(now))
                .map(DueTicker::from_time_ticker)
                .collect(),
            TickerKind::CronOccurrence => state
                .occurrences
                .values()
                .filter(|o| o.is_due(now))
                .filter_map(|o| state.due_occurrence(o))
                .collect(),
        };
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn try_claim(
        &self,
        kind: TickerKind,
        id: Uuid,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let Some(mut row) = state.lock_view(kind, id) else {
            return Ok(false);
        };

        let claimable = match *row.status {
            TickerStatus::Queued => true,
            TickerStatus::Idle => !row.is_child,
            _ => false,
        };
        if !claimable || *row.due_at > now {
            return Ok(false);
        }

        *row.status = TickerStatus::InProgress;
        *row.locked_by = Some(node_id.to_string());
        *row.locked_at = Some(now);
        *row.updated_at = now;
        Ok(true)
    }

    async fn release(&self, kind: TickerKind, id: Uuid, node_id: &str) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let Some(mut row) = state.lock_view(kind, id) else {
            return Ok(false);
        };
        if !row.held_by(node_id) {
            debug!("Release of {} ignored: not held by {}", id, node_id);
            return Ok(false);
        }

        *row.status = TickerStatus::Queued;
        row.clear_lock();
        *row.updated_at = Utc::now();
        Ok(true)
    }

    async fn reschedule(
        &self,
        kind: TickerKind,
        id: Uuid,
        node_id: &str,
        next_due: DateTime<Utc>,
        status: TickerStatus,
        exception_message: Option<String>,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let Some(mut row) = state.lock_view(kind, id) else {
            return Ok(false);
        };
        if !row.held_by(node_id) {
            debug!("Reschedule of {} ignored: not held by {}", id, node_id);
            return Ok(false);
        }

        *row.status = status;
        *row.due_at = next_due;
        *row.retry_count += 1;
        if exception_message.is_some() {
            *row.exception_message = exception_message;
        }
        row.clear_lock();
        *row.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_terminal(
        &self,
        kind: TickerKind,
        id: Uuid,
        node_id: &str,
        status: TickerStatus,
        completion: TickerCompletion,
    ) -> SchedulerResult<bool> {
        if !status.is_terminal() {
            return Err(SchedulerError::validation(format!(
                "{status} is not a terminal status"
            )));
        }

        let mut state = self.state.write().await;
        let Some(mut row) = state.lock_view(kind, id) else {
            return Ok(false);
        };
        if !row.held_by(node_id) {
            debug!("Terminal write of {} ignored: not held by {}", id, node_id);
            return Ok(false);
        }

        *row.status = status;
        if completion.executed_at.is_some() {
            *row.executed_at = completion.executed_at;
        }
        if completion.elapsed_ms.is_some() {
            *row.elapsed_ms = completion.elapsed_ms;
        }
        if completion.exception_message.is_some() {
            *row.exception_message = completion.exception_message;
        }
        *row.skipped_reason = completion.skipped_reason;
        row.clear_lock();
        *row.updated_at = Utc::now();
        Ok(true)
    }

    async fn transition(
        &self,
        kind: TickerKind,
        id: Uuid,
        from: TickerStatus,
        to: TickerStatus,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        let Some(mut row) = state.lock_view(kind, id) else {
            return Ok(false);
        };
        if *row.status != from {
            return Ok(false);
        }
        *row.status = to;
        if to != TickerStatus::InProgress {
            row.clear_lock();
        }
        *row.updated_at = Utc::now();
        Ok(true)
    }

    async fn upsert_occurrence(
        &self,
        cron_ticker_id: Uuid,
        boundary: DateTime<Utc>,
    ) -> SchedulerResult<(CronTickerOccurrence, bool)> {
        let mut state = self.state.write().await;
        if !state.cron_tickers.contains_key(&cron_ticker_id) {
            return Err(SchedulerError::ticker_not_found(cron_ticker_id));
        }

        if let Some(existing) = state
            .occurrence_index
            .get(&(cron_ticker_id, boundary))
            .and_then(|id| state.occurrences.get(id))
        {
            return Ok((existing.clone(), false));
        }

        let occurrence = CronTickerOccurrence::new(cron_ticker_id, boundary);
        state
            .occurrence_index
            .insert((cron_ticker_id, boundary), occurrence.id);
        state.occurrences.insert(occurrence.id, occurrence.clone());
        debug!(
            "Materialized occurrence {} for cron ticker {} at {}",
            occurrence.id, cron_ticker_id, boundary
        );
        Ok((occurrence, true))
    }

    async fn reclaim_locked_by(&self, node_id: &str) -> SchedulerResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut reclaimed = 0u64;

        for ticker in state.time_tickers.values_mut() {
            if ticker.status == TickerStatus::InProgress
                && ticker.locked_by.as_deref() == Some(node_id)
            {
                ticker.status = TickerStatus::Queued;
                ticker.locked_by = None;
                ticker.locked_at = None;
                ticker.updated_at = now;
                reclaimed += 1;
            }
        }
        for occurrence in state.occurrences.values_mut() {
            if occurrence.status == TickerStatus::InProgress
                && occurrence.locked_by.as_deref() == Some(node_id)
            {
                occurrence.status = TickerStatus::Queued;
                occurrence.locked_by = None;
                occurrence.locked_at = None;
                occurrence.updated_at = now;
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            info!("Reclaimed {} tickers locked by node {}", reclaimed, node_id);
        }
        Ok(reclaimed)
    }

    async fn find_locked_by(&self, node_id: &str) -> SchedulerResult<Vec<DueTicker>> {
        let state = self.state.read().await;
        let locked = |status: TickerStatus, locked_by: &Option<String>| {
            status == TickerStatus::InProgress && locked_by.as_deref() == Some(node_id)
        };

        let mut rows: Vec<DueTicker> = state
            .time_tickers
            .values()
            .filter(|t| locked(t.status, &t.locked_by))
            .map(DueTicker::from_time_ticker)
            .collect();
        rows.extend(
            state
                .occurrences
                .values()
                .filter(|o| locked(o.status, &o.locked_by))
                .filter_map(|o| state.due_occurrence(o)),
        );
        Ok(rows)
    }

    async fn add_time_tickers(&self, tickers: Vec<TimeTicker>) -> SchedulerResult<Vec<TimeTicker>> {
        let mut state = self.state.write().await;
        if let Some(dup) = tickers
            .iter()
            .find(|t| state.time_tickers.contains_key(&t.id))
        {
            return Err(SchedulerError::validation(format!(
                "time ticker {} already exists",
                dup.id
            )));
        }
        for ticker in &tickers {
            state.time_tickers.insert(ticker.id, ticker.clone());
        }
        Ok(tickers)
    }

    async fn update_time_tickers(
        &self,
        tickers: Vec<TimeTicker>,
    ) -> SchedulerResult<Vec<TimeTicker>> {
        let mut state = self.state.write().await;
        for ticker in &tickers {
            match state.time_tickers.get(&ticker.id) {
                None => return Err(SchedulerError::ticker_not_found(ticker.id)),
                Some(stored) if stored.status == TickerStatus::InProgress => {
                    return Err(SchedulerError::validation(format!(
                        "ticker {} is in progress and cannot be updated",
                        ticker.id
                    )));
                }
                Some(_) => {}
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(tickers.len());
        for ticker in &tickers {
            if let Some(stored) = state.time_tickers.get_mut(&ticker.id) {
                stored.apply_edit(ticker, now);
                updated.push(stored.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_time_tickers(&self, ids: &[Uuid]) -> SchedulerResult<u64> {
        let mut state = self.state.write().await;
        let doomed = state.collect_descendants(ids);
        for id in &doomed {
            state.time_tickers.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn get_time_ticker(&self, id: Uuid) -> SchedulerResult<Option<TimeTicker>> {
        Ok(self.state.read().await.time_tickers.get(&id).cloned())
    }

    async fn children_of(&self, parent_id: Uuid) -> SchedulerResult<Vec<TimeTicker>> {
        let state = self.state.read().await;
        let mut children: Vec<TimeTicker> = state
            .time_tickers
            .values()
            .filter(|t| t.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn find_by_batch(&self, batch_parent: Uuid) -> SchedulerResult<Vec<TimeTicker>> {
        let state = self.state.read().await;
        let mut members: Vec<TimeTicker> = state
            .time_tickers
            .values()
            .filter(|t| t.batch_parent == Some(batch_parent))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.execution_time.cmp(&b.execution_time));
        Ok(members)
    }

    async fn add_cron_tickers(&self, tickers: Vec<CronTicker>) -> SchedulerResult<Vec<CronTicker>> {
        let mut state = self.state.write().await;
        if let Some(dup) = tickers
            .iter()
            .find(|t| state.cron_tickers.contains_key(&t.id))
        {
            return Err(SchedulerError::validation(format!(
                "cron ticker {} already exists",
                dup.id
            )));
        }
        for ticker in &tickers {
            state.cron_tickers.insert(ticker.id, ticker.clone());
        }
        Ok(tickers)
    }

    async fn update_cron_tickers(
        &self,
        tickers: Vec<CronTicker>,
    ) -> SchedulerResult<Vec<CronTicker>> {
        let mut state = self.state.write().await;
        if let Some(missing) = tickers
            .iter()
            .find(|t| !state.cron_tickers.contains_key(&t.id))
        {
            return Err(SchedulerError::ticker_not_found(missing.id));
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(tickers.len());
        for ticker in &tickers {
            if let Some(stored) = state.cron_tickers.get_mut(&ticker.id) {
                stored.apply_edit(ticker, now);
                updated.push(stored.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_cron_tickers(&self, ids: &[Uuid]) -> SchedulerResult<u64> {
        let mut state = self.state.write().await;
        let mut removed = 0u64;
        for id in ids {
            if state.cron_tickers.remove(id).is_none() {
                continue;
            }
            removed += 1;
            state.occurrences.retain(|_, o| o.cron_ticker_id != *id);
            state.occurrence_index.retain(|(cron_id, _), _| cron_id != id);
        }
        Ok(removed)
    }

    async fn get_cron_ticker(&self, id: Uuid) -> SchedulerResult<Option<CronTicker>> {
        Ok(self.state.read().await.cron_tickers.get(&id).cloned())
    }

    async fn list_cron_tickers(&self) -> SchedulerResult<Vec<CronTicker>> {
        let state = self.state.read().await;
        let mut tickers: Vec<CronTicker> = state.cron_tickers.values().cloned().collect();
        tickers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tickers)
    }

    async fn set_next_occurrence(
        &self,
        cron_ticker_id: Uuid,
        next: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let ticker = state
            .cron_tickers
            .get_mut(&cron_ticker_id)
            .ok_or_else(|| SchedulerError::ticker_not_found(cron_ticker_id))?;
        ticker.next_occurrence = next;
        Ok(())
    }

    async fn get_occurrence(&self, id: Uuid) -> SchedulerResult<Option<CronTickerOccurrence>> {
        Ok(self.state.read().await.occurrences.get(&id).cloned())
    }

    async fn occurrences_of(
        &self,
        cron_ticker_id: Uuid,
    ) -> SchedulerResult<Vec<CronTickerOccurrence>> {
        let state = self.state.read().await;
        let mut occurrences: Vec<CronTickerOccurrence> = state
            .occurrences
            .values()
            .filter(|o| o.cron_ticker_id == cron_ticker_id)
            .cloned()
            .collect();
        occurrences.sort_by(|a, b| a.execution_time.cmp(&b.execution_time));
        Ok(occurrences)
    }
}
