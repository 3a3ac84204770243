#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use ticker_core::{
        models::{
            CronTicker, CronTickerOccurrence, DueTicker, RunCondition, TickerCompletion,
            TickerKind, TickerStatus, TimeTicker,
        },
        traits::{HandlerRegistry, TickerStore},
        AppConfig, Clock, DefaultHandlerRegistry, SchedulerError, SchedulerResult,
    };
    use ticker_dispatcher::{
        DependencyChecker, OutcomeHandler, RetryPolicy, TickerNode, TickerRetryService,
    };
    use ticker_infrastructure::{InMemoryCoordinationStore, InMemoryTickerStore, MetricsCollector};
    use ticker_testing_utils::{CountingHandler, ManualClock, TimeTickerBuilder};
    use ticker_worker::{ExecutionOutcome, ExecutionReport};
    use uuid::Uuid;

    /// 前 `failures` 次 `set_terminal` 返回存储错误，其余调用转给内存存储
    struct FlakyTerminalStore {
        inner: Arc<InMemoryTickerStore>,
        failures: usize,
        terminal_calls: AtomicUsize,
    }

    impl FlakyTerminalStore {
        fn new(inner: Arc<InMemoryTickerStore>, failures: usize) -> Self {
            Self {
                inner,
                failures,
                terminal_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TickerStore for FlakyTerminalStore {
        async fn find_due(
            &self,
            kind: TickerKind,
            now: DateTime<Utc>,
        ) -> SchedulerResult<Vec<DueTicker>> {
            self.inner.find_due(kind, now).await
        }

        async fn try_claim(
            &self,
            kind: TickerKind,
            id: Uuid,
            node_id: &str,
            now: DateTime<Utc>,
        ) -> SchedulerResult<bool> {
            self.inner.try_claim(kind, id, node_id, now).await
        }

        async fn release(&self, kind: TickerKind, id: Uuid, node_id: &str) -> SchedulerResult<bool> {
            self.inner.release(kind, id, node_id).await
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
            self.inner
                .reschedule(kind, id, node_id, next_due, status, exception_message)
                .await
        }

        async fn set_terminal(
            &self,
            kind: TickerKind,
            id: Uuid,
            node_id: &str,
            status: TickerStatus,
            completion: TickerCompletion,
        ) -> SchedulerResult<bool> {
            if self.terminal_calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(SchedulerError::store("connection reset"));
            }
            self.inner
                .set_terminal(kind, id, node_id, status, completion)
                .await
        }

        async fn transition(
            &self,
            kind: TickerKind,
            id: Uuid,
            from: TickerStatus,
            to: TickerStatus,
        ) -> SchedulerResult<bool> {
            self.inner.transition(kind, id, from, to).await
        }

        async fn upsert_occurrence(
            &self,
            cron_ticker_id: Uuid,
            boundary: DateTime<Utc>,
        ) -> SchedulerResult<(CronTickerOccurrence, bool)> {
            self.inner.upsert_occurrence(cron_ticker_id, boundary).await
        }

        async fn reclaim_locked_by(&self, node_id: &str) -> SchedulerResult<u64> {
            self.inner.reclaim_locked_by(node_id).await
        }

        async fn find_locked_by(&self, node_id: &str) -> SchedulerResult<Vec<DueTicker>> {
            self.inner.find_locked_by(node_id).await
        }

        async fn add_time_tickers(
            &self,
            tickers: Vec<TimeTicker>,
        ) -> SchedulerResult<Vec<TimeTicker>> {
            self.inner.add_time_tickers(tickers).await
        }

        async fn update_time_tickers(
            &self,
            tickers: Vec<TimeTicker>,
        ) -> SchedulerResult<Vec<TimeTicker>> {
            self.inner.update_time_tickers(tickers).await
        }

        async fn delete_time_tickers(&self, ids: &[Uuid]) -> SchedulerResult<u64> {
            self.inner.delete_time_tickers(ids).await
        }

        async fn get_time_ticker(&self, id: Uuid) -> SchedulerResult<Option<TimeTicker>> {
            self.inner.get_time_ticker(id).await
        }

        async fn children_of(&self, parent_id: Uuid) -> SchedulerResult<Vec<TimeTicker>> {
            self.inner.children_of(parent_id).await
        }

        async fn find_by_batch(&self, batch_parent: Uuid) -> SchedulerResult<Vec<TimeTicker>> {
            self.inner.find_by_batch(batch_parent).await
        }

        async fn add_cron_tickers(
            &self,
            tickers: Vec<CronTicker>,
        ) -> SchedulerResult<Vec<CronTicker>> {
            self.inner.add_cron_tickers(tickers).await
        }

        async fn update_cron_tickers(
            &self,
            tickers: Vec<CronTicker>,
        ) -> SchedulerResult<Vec<CronTicker>> {
            self.inner.update_cron_tickers(tickers).await
        }

        async fn delete_cron_tickers(&self, ids: &[Uuid]) -> SchedulerResult<u64> {
            self.inner.delete_cron_tickers(ids).await
        }

        async fn get_cron_ticker(&self, id: Uuid) -> SchedulerResult<Option<CronTicker>> {
            self.inner.get_cron_ticker(id).await
        }

        async fn list_cron_tickers(&self) -> SchedulerResult<Vec<CronTicker>> {
            self.inner.list_cron_tickers().await
        }

        async fn set_next_occurrence(
            &self,
            cron_ticker_id: Uuid,
            next: Option<DateTime<Utc>>,
        ) -> SchedulerResult<()> {
            self.inner.set_next_occurrence(cron_ticker_id, next).await
        }

        async fn get_occurrence(&self, id: Uuid) -> SchedulerResult<Option<CronTickerOccurrence>> {
            self.inner.get_occurrence(id).await
        }

        async fn occurrences_of(
            &self,
            cron_ticker_id: Uuid,
        ) -> SchedulerResult<Vec<CronTickerOccurrence>> {
            self.inner.occurrences_of(cron_ticker_id).await
        }
    }

    fn outcome_handler(
        node_id: &str,
        store: Arc<dyn TickerStore>,
        clock: &ManualClock,
    ) -> OutcomeHandler {
        let retry_service = Arc::new(TickerRetryService::new(
            node_id,
            Arc::clone(&store),
            Arc::new(clock.clone()),
            RetryPolicy::default(),
        ));
        let dependency_checker = Arc::new(DependencyChecker::new(Arc::clone(&store), 5));
        OutcomeHandler::new(
            node_id,
            store,
            retry_service,
            dependency_checker,
            Arc::new(MetricsCollector::new(false)),
        )
        .with_writeback_backoff(StdDuration::from_millis(10))
    }

    fn report(
        ticker: &TimeTicker,
        node_id: &str,
        outcome: ExecutionOutcome,
        now: DateTime<Utc>,
    ) -> ExecutionReport {
        let mut due = DueTicker::from_time_ticker(ticker);
        due.mark_claimed(node_id, now);
        ExecutionReport {
            ticker: due,
            outcome,
            started_at: Some(now),
            elapsed_ms: 5,
        }
    }

    fn node_over(
        store: Arc<dyn TickerStore>,
        handler: CountingHandler,
        clock: &ManualClock,
    ) -> TickerNode {
        let registry: Arc<dyn HandlerRegistry> = Arc::new(
            DefaultHandlerRegistry::builder()
                .register("job", Arc::new(handler))
                .build()
                .unwrap(),
        );
        let mut config = AppConfig::default();
        config.node.node_id = "node-a".to_string();
        config.observability.metrics_enabled = false;
        TickerNode::new(
            config,
            store,
            Arc::new(InMemoryCoordinationStore::new()),
            registry,
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_result_from_reclaimed_node_is_discarded() {
        let clock = ManualClock::at_epoch();
        let now = clock.now();
        let store = Arc::new(InMemoryTickerStore::new());
        let parent = TimeTickerBuilder::new("job")
            .at(now)
            .with_retries(3, vec![30])
            .build();
        let on_failure = TimeTickerBuilder::new("job")
            .at(now)
            .child_of(parent.id, RunCondition::OnFailure)
            .build();
        let on_success = TimeTickerBuilder::new("job")
            .at(now)
            .child_of(parent.id, RunCondition::OnSuccess)
            .build();
        store
            .add_time_tickers(vec![parent.clone(), on_failure.clone(), on_success.clone()])
            .await
            .unwrap();

        // node-a 失联后任务被回收并由 node-b 重新抢占
        assert!(store.try_claim(TickerKind::Time, parent.id, "node-a", now).await.unwrap());
        store.reclaim_locked_by("node-a").await.unwrap();
        assert!(store.try_claim(TickerKind::Time, parent.id, "node-b", now).await.unwrap());

        let stale = outcome_handler("node-a", store.clone(), &clock);
        let failed = ExecutionOutcome::Failed {
            message: "late failure".to_string(),
        };
        assert_eq!(
            stale.apply(report(&parent, "node-a", failed, now)).await.unwrap(),
            None
        );
        let succeeded = ExecutionOutcome::Succeeded {
            status: TickerStatus::DueDone,
        };
        assert_eq!(
            stale
                .apply(report(&parent, "node-a", succeeded.clone(), now))
                .await
                .unwrap(),
            None
        );

        let row = store.get_time_ticker(parent.id).await.unwrap().unwrap();
        assert_eq!(row.status, TickerStatus::InProgress);
        assert_eq!(row.locked_by.as_deref(), Some("node-b"));
        assert_eq!(row.retry_count, 0);
        assert!(!store.try_claim(TickerKind::Time, parent.id, "node-c", now).await.unwrap());
        for child in [&on_failure, &on_success] {
            let child = store.get_time_ticker(child.id).await.unwrap().unwrap();
            assert_eq!(child.status, TickerStatus::Idle);
        }

        let holder = outcome_handler("node-b", store.clone(), &clock);
        let applied = holder
            .apply(report(&parent, "node-b", succeeded, now))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.status, TickerStatus::DueDone);
        assert_eq!(applied.children_queued, 1);
        let child = store.get_time_ticker(on_success.id).await.unwrap().unwrap();
        assert_eq!(child.status, TickerStatus::Queued);
    }

    #[tokio::test]
    async fn test_failed_write_back_is_retried() {
        let clock = ManualClock::at_epoch();
        let inner = Arc::new(InMemoryTickerStore::new());
        let store: Arc<dyn TickerStore> = Arc::new(FlakyTerminalStore::new(inner.clone(), 1));
        let handler = CountingHandler::new();
        let node = node_over(store, handler.clone(), &clock);
        let dispatcher = node.dispatcher();

        let ticker = TimeTickerBuilder::new("job").at(clock.now()).build();
        let id = ticker.id;
        inner.add_time_tickers(vec![ticker]).await.unwrap();

        assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 1);
        dispatcher.wait_for_idle().await;

        let row = inner.get_time_ticker(id).await.unwrap().unwrap();
        assert!(row.status.is_successful());
        assert!(row.locked_by.is_none());
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_write_back_gives_up_and_releases_claim() {
        let clock = ManualClock::at_epoch();
        let inner = Arc::new(InMemoryTickerStore::new());
        let flaky = Arc::new(FlakyTerminalStore::new(inner.clone(), usize::MAX));
        let store: Arc<dyn TickerStore> = flaky.clone();
        let handler = CountingHandler::new();
        let node = node_over(store, handler.clone(), &clock);
        let dispatcher = node.dispatcher();

        let ticker = TimeTickerBuilder::new("job").at(clock.now()).build();
        let id = ticker.id;
        inner.add_time_tickers(vec![ticker]).await.unwrap();

        assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 1);
        dispatcher.wait_for_idle().await;

        let row = inner.get_time_ticker(id).await.unwrap().unwrap();
        assert_eq!(row.status, TickerStatus::Queued);
        assert!(row.locked_by.is_none());
        assert_eq!(row.retry_count, 0);
        assert!(flaky.terminal_calls.load(Ordering::SeqCst) >= 3);

        // 下个周期重新执行
        assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 1);
        dispatcher.wait_for_idle().await;
        assert_eq!(handler.calls(), 2);
    }
}
