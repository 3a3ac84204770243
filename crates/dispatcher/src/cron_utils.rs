use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use ticker_core::{SchedulerError, SchedulerResult};

/// 表达式字段数：秒 分 时 日 月 周
pub const CRON_FIELD_COUNT: usize = 6;

/// CRON表达式解析和边界计算
///
/// 只接受六字段表达式。数字形式的星期字段沿用 `cron` crate 的约定
/// （1 = 周日），推荐使用 `MON-FRI` 这样的名称。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let expression = cron_expr.trim();
        let fields = expression.split_whitespace().count();
        if fields != CRON_FIELD_COUNT {
            return Err(SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: format!("expected {CRON_FIELD_COUNT} fields, found {fields}"),
            });
        }

        let schedule = Schedule::from_str(expression).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 严格晚于 `after` 的最早边界
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).find(|t| *t > after)
    }

    /// `(from, to]` 内的边界，按时间升序，最多 `max` 个
    pub fn occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max: usize,
    ) -> Vec<DateTime<Utc>> {
        if to <= from || max == 0 {
            return Vec::new();
        }
        let boundaries: Vec<DateTime<Utc>> = self
            .schedule
            .after(&from)
            .skip_while(|t| *t <= from)
            .take_while(|t| *t <= to)
            .take(max)
            .collect();
        debug!(
            "CRON表达式 {} 在 ({}, {}] 内有 {} 个边界",
            self.expression,
            from.format("%Y-%m-%d %H:%M:%S UTC"),
            to.format("%Y-%m-%d %H:%M:%S UTC"),
            boundaries.len()
        );
        boundaries
    }

    /// 获取从指定时间开始的多个执行时间，用于预览
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&from)
            .skip_while(|t| *t <= from)
            .take(count)
            .collect()
    }

    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// 计算表达式在 `after` 之后的下一个边界
pub fn next_occurrence(expression: &str, after: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
    CronScheduler::new(expression)?
        .next_occurrence(after)
        .ok_or_else(|| SchedulerError::InvalidCron {
            expr: expression.to_string(),
            message: format!("no occurrence after {after}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_next_occurrence_is_strictly_after() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();
        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_occurrence(on_boundary),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap())
        );

        let mid = on_boundary + Duration::milliseconds(500);
        assert_eq!(
            scheduler.next_occurrence(mid),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap())
        );
    }

    #[test]
    fn test_field_count_enforced() {
        assert!(matches!(
            CronScheduler::new("* * * * *"),
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert!(CronScheduler::new("0 0 0 1 1 * 2030").is_err());
        assert!(CronScheduler::new("@hourly").is_err());
    }

    #[test]
    fn test_window_excludes_start_includes_end() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 1, 12, 3, 0).unwrap();

        let boundaries = scheduler.occurrences_between(from, to, 100);
        assert_eq!(
            boundaries,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 2, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 12, 3, 0).unwrap(),
            ]
        );
        assert_eq!(scheduler.occurrences_between(from, to, 2).len(), 2);
        assert!(scheduler.occurrences_between(to, from, 10).is_empty());
    }
}
