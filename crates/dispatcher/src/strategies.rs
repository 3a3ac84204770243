use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use ticker_core::models::{DueTicker, TickerKind};

/// 一个调度周期的执行计划
#[derive(Debug, Default)]
pub struct DispatchPlan {
    /// 占用并发槽位的任务，已按执行顺序排列
    pub bounded: Vec<DueTicker>,
    /// LongRunning 任务，不占用槽位
    pub long_running: Vec<DueTicker>,
}

impl DispatchPlan {
    pub fn len(&self) -> usize {
        self.bounded.len() + self.long_running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounded.is_empty() && self.long_running.is_empty()
    }
}

/// 决定到期任务的执行顺序
pub trait DispatchStrategy: Send + Sync {
    fn plan(&self, candidates: Vec<DueTicker>) -> DispatchPlan;

    fn name(&self) -> &str;
}

/// 优先级策略：High → Normal → Low，同级按 `due_at`、`execution_time`、id 先进先出
#[derive(Debug, Default)]
pub struct PriorityStrategy;

impl PriorityStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchStrategy for PriorityStrategy {
    fn plan(&self, candidates: Vec<DueTicker>) -> DispatchPlan {
        let (mut long_running, mut bounded): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|t| t.priority.is_long_running());

        bounded.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.due_at.cmp(&b.due_at))
                .then(a.execution_time.cmp(&b.execution_time))
                .then(a.id.cmp(&b.id))
        });
        long_running.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then(a.execution_time.cmp(&b.execution_time))
                .then(a.id.cmp(&b.id))
        });

        debug!(
            "优先级策略生成执行计划: 有界任务 {} 个, 长任务 {} 个",
            bounded.len(),
            long_running.len()
        );
        DispatchPlan {
            bounded,
            long_running,
        }
    }

    fn name(&self) -> &str {
        "Priority"
    }
}

/// 同一 CRON 任务有多个到期触发时，给较旧的触发标记取代它的最新边界
pub fn mark_superseded(candidates: &mut [DueTicker]) -> usize {
    let mut newest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    for ticker in candidates.iter() {
        if let (TickerKind::CronOccurrence, Some(cron_id)) = (ticker.kind, ticker.cron_ticker_id) {
            newest
                .entry(cron_id)
                .and_modify(|t| *t = (*t).max(ticker.execution_time))
                .or_insert(ticker.execution_time);
        }
    }

    let mut marked = 0;
    for ticker in candidates.iter_mut() {
        let Some(latest) = ticker.cron_ticker_id.and_then(|id| newest.get(&id)) else {
            continue;
        };
        if ticker.execution_time < *latest {
            ticker.superseded_by = Some(*latest);
            marked += 1;
        }
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ticker_core::models::{
        CronTicker, CronTickerOccurrence, TickerPriority, TimeTicker,
    };

    fn due(priority: TickerPriority, due_at: DateTime<Utc>) -> DueTicker {
        let mut ticker = TimeTicker::new("job", due_at);
        ticker.priority = priority;
        DueTicker::from_time_ticker(&ticker)
    }

    #[test]
    fn test_priority_then_fifo() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let low = due(TickerPriority::Low, t0);
        let normal_late = due(TickerPriority::Normal, t0 + Duration::seconds(5));
        let normal_early = due(TickerPriority::Normal, t0 + Duration::seconds(1));
        let high = due(TickerPriority::High, t0 + Duration::seconds(10));
        let long = due(TickerPriority::LongRunning, t0);

        let plan = PriorityStrategy::new().plan(vec![
            low.clone(),
            normal_late.clone(),
            long.clone(),
            high.clone(),
            normal_early.clone(),
        ]);

        let order: Vec<Uuid> = plan.bounded.iter().map(|t| t.id).collect();
        assert_eq!(order, vec![high.id, normal_early.id, normal_late.id, low.id]);
        assert_eq!(plan.long_running.len(), 1);
        assert_eq!(plan.long_running[0].id, long.id);
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_older_occurrences_marked_superseded() {
        let cron = CronTicker::new("tick", "0 * * * * *");
        let other = CronTicker::new("other", "0 * * * * *");
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + Duration::minutes(1);

        let mut candidates = vec![
            DueTicker::from_occurrence(&cron, &CronTickerOccurrence::new(cron.id, t0)),
            DueTicker::from_occurrence(&cron, &CronTickerOccurrence::new(cron.id, t1)),
            DueTicker::from_occurrence(&other, &CronTickerOccurrence::new(other.id, t0)),
            due(TickerPriority::Normal, t0),
        ];

        assert_eq!(mark_superseded(&mut candidates), 1);
        assert_eq!(candidates[0].superseded_by, Some(t1));
        assert!(candidates[1].superseded_by.is_none());
        assert!(candidates[2].superseded_by.is_none());
        assert!(candidates[3].superseded_by.is_none());
    }
}
