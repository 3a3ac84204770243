#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use ticker_core::{
        models::{TickerPriority, TickerStatus},
        traits::{HandlerRegistry, TickerStore},
        AppConfig, Clock, DefaultHandlerRegistry, SystemClock,
    };
    use ticker_dispatcher::TickerNode;
    use ticker_infrastructure::{InMemoryCoordinationStore, InMemoryTickerStore};
    use ticker_testing_utils::{
        CountingHandler, CronTickerBuilder, FailingHandler, ManualClock, SlowHandler,
        TimeTickerBuilder,
    };

    fn test_config(node_id: &str, max_concurrency: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.node.node_id = node_id.to_string();
        config.dispatcher.max_concurrency = max_concurrency;
        config.observability.metrics_enabled = false;
        config
    }

    fn build_node(
        config: AppConfig,
        store: Arc<InMemoryTickerStore>,
        registry: DefaultHandlerRegistry,
        clock: Arc<dyn Clock>,
    ) -> TickerNode {
        let registry: Arc<dyn HandlerRegistry> = Arc::new(registry);
        TickerNode::new(
            config,
            store,
            Arc::new(InMemoryCoordinationStore::new()),
            registry,
            clock,
        )
    }

    #[tokio::test]
    async fn test_retry_schedule_then_permanent_failure() {
        let clock = ManualClock::at_epoch();
        let t0 = clock.now();
        let store = Arc::new(InMemoryTickerStore::new());
        let handler = FailingHandler::always();
        let registry = DefaultHandlerRegistry::builder()
            .register("flaky", Arc::new(handler.clone()))
            .build()
            .unwrap();
        let node = build_node(
            test_config("node-a", 4),
            store.clone(),
            registry,
            Arc::new(clock.clone()),
        );
        let dispatcher = node.dispatcher();

        let ticker = TimeTickerBuilder::new("flaky")
            .at(t0)
            .with_retries(2, vec![60, 300])
            .build();
        let id = ticker.id;
        store.add_time_tickers(vec![ticker]).await.unwrap();

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.claimed, 1);
        dispatcher.wait_for_idle().await;

        let row = store.get_time_ticker(id).await.unwrap().unwrap();
        assert_eq!(row.status, TickerStatus::Queued);
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.due_at, t0 + Duration::seconds(60));
        assert!(row.locked_by.is_none());
        assert!(row.exception_message.unwrap().contains("scripted failure"));

        // 退避期间不会被调度
        assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 0);

        clock.advance(Duration::seconds(60));
        assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 1);
        dispatcher.wait_for_idle().await;

        let row = store.get_time_ticker(id).await.unwrap().unwrap();
        assert_eq!(row.status, TickerStatus::Queued);
        assert_eq!(row.retry_count, 2);
        assert_eq!(row.due_at, t0 + Duration::seconds(360));

        clock.advance(Duration::seconds(300));
        assert_eq!(dispatcher.run_cycle().await.unwrap().claimed, 1);
        dispatcher.wait_for_idle().await;

        let row = store.get_time_ticker(id).await.unwrap().unwrap();
        assert_eq!(row.status, TickerStatus::Failed);
        assert_eq!(handler.attempts(), 3);
        assert_eq!(handler.observed_retry_counts(), vec![0, 1, 2]);

        clock.advance(Duration::hours(1));
        assert_eq!(dispatcher.run_cycle().await.unwrap().due, 0);
    }

    #[tokio::test]
    async fn test_start_at_execution_time_is_due_done() {
        let clock = ManualClock::at_epoch();
        let t0 = clock.now();
        let store = Arc::new(InMemoryTickerStore::new());
        let registry = DefaultHandlerRegistry::builder()
            .register("job", Arc::new(CountingHandler::new()))
            .build()
            .unwrap();
        let node = build_node(
            test_config("node-a", 4),
            store.clone(),
            registry,
            Arc::new(clock.clone()),
        );
        let dispatcher = node.dispatcher();

        let on_time = TimeTickerBuilder::new("job").at(t0).build();
        let late = TimeTickerBuilder::new("job")
            .at(t0 - Duration::seconds(1))
            .build();
        store
            .add_time_tickers(vec![on_time.clone(), late.clone()])
            .await
            .unwrap();

        dispatcher.run_cycle().await.unwrap();
        dispatcher.wait_for_idle().await;

        let on_time = store.get_time_ticker(on_time.id).await.unwrap().unwrap();
        let late = store.get_time_ticker(late.id).await.unwrap().unwrap();
        assert_eq!(on_time.status, TickerStatus::DueDone);
        assert_eq!(late.status, TickerStatus::Done);
        assert_eq!(on_time.executed_at, Some(t0));
    }

    #[tokio::test]
    async fn test_priority_order_under_single_slot() {
        let store = Arc::new(InMemoryTickerStore::new());
        let handler = CountingHandler::new();
        let registry = DefaultHandlerRegistry::builder()
            .register("job", Arc::new(handler.clone()))
            .build()
            .unwrap();
        let node = build_node(
            test_config("node-a", 1),
            store.clone(),
            registry,
            Arc::new(SystemClock),
        );
        let dispatcher = node.dispatcher();

        let low = TimeTickerBuilder::new("job")
            .with_priority(TickerPriority::Low)
            .due_in(-Duration::seconds(30))
            .build();
        let normal = TimeTickerBuilder::new("job")
            .with_priority(TickerPriority::Normal)
            .due_in(-Duration::seconds(20))
            .build();
        let high = TimeTickerBuilder::new("job")
            .with_priority(TickerPriority::High)
            .due_in(-Duration::seconds(10))
            .build();
        store
            .add_time_tickers(vec![low.clone(), normal.clone(), high.clone()])
            .await
            .unwrap();

        for expected_deferred in [2, 1, 0] {
            let report = dispatcher.run_cycle().await.unwrap();
            assert_eq!(report.claimed, 1);
            assert_eq!(report.deferred, expected_deferred);
            dispatcher.wait_for_idle().await;
        }

        assert_eq!(handler.seen_ids(), vec![high.id, normal.id, low.id]);
    }

    #[tokio::test]
    async fn test_concurrency_cap_with_long_running_bypass() {
        let store = Arc::new(InMemoryTickerStore::new());
        let bounded = SlowHandler::new(StdDuration::from_millis(100));
        let long = SlowHandler::new(StdDuration::from_millis(100));
        let registry = DefaultHandlerRegistry::builder()
            .register("bounded", Arc::new(bounded.clone()))
            .register("long", Arc::new(long.clone()))
            .build()
            .unwrap();
        let node = build_node(
            test_config("node-a", 2),
            store.clone(),
            registry,
            Arc::new(SystemClock),
        );
        let dispatcher = node.dispatcher();

        let mut rows: Vec<_> = (0..5)
            .map(|_| TimeTickerBuilder::new("bounded").build())
            .collect();
        rows.extend((0..2).map(|_| {
            TimeTickerBuilder::new("long")
                .with_priority(TickerPriority::LongRunning)
                .build()
        }));
        store.add_time_tickers(rows).await.unwrap();

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.due, 7);
        assert_eq!(report.claimed, 4);
        assert_eq!(report.deferred, 3);
        assert_eq!(dispatcher.available_slots(), 0);

        dispatcher.wait_for_idle().await;
        assert_eq!(long.completed(), 2);
        assert_eq!(long.peak_concurrency(), 2);

        let mut cycles = 1;
        while bounded.completed() < 5 {
            dispatcher.run_cycle().await.unwrap();
            dispatcher.wait_for_idle().await;
            cycles += 1;
            assert!(cycles <= 5, "bounded work did not drain");
        }
        assert_eq!(bounded.peak_concurrency(), 2);
        assert_eq!(dispatcher.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_dispatchers_claim_once() {
        let store = Arc::new(InMemoryTickerStore::new());
        let handler = CountingHandler::new();
        let registry = || {
            DefaultHandlerRegistry::builder()
                .register("job", Arc::new(handler.clone()))
                .build()
                .unwrap()
        };
        let node_a = build_node(
            test_config("node-a", 4),
            store.clone(),
            registry(),
            Arc::new(SystemClock),
        );
        let node_b = build_node(
            test_config("node-b", 4),
            store.clone(),
            registry(),
            Arc::new(SystemClock),
        );

        let ticker = TimeTickerBuilder::new("job").build();
        store.add_time_tickers(vec![ticker]).await.unwrap();

        let (dispatcher_a, dispatcher_b) = (node_a.dispatcher(), node_b.dispatcher());
        let (a, b) = tokio::join!(dispatcher_a.run_cycle(), dispatcher_b.run_cycle());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.claimed + b.claimed, 1);

        node_a.drain().await;
        node_b.drain().await;
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_cron_materialization_is_idempotent_and_supersedes() {
        let clock = ManualClock::at_epoch();
        let t0 = clock.now();
        let store = Arc::new(InMemoryTickerStore::new());
        let handler = CountingHandler::new();
        let registry = DefaultHandlerRegistry::builder()
            .register("tick", Arc::new(handler.clone()))
            .build()
            .unwrap();
        let node = build_node(
            test_config("node-a", 4),
            store.clone(),
            registry,
            Arc::new(clock.clone()),
        );
        let dispatcher = node.dispatcher();

        let cron = CronTickerBuilder::new("tick", "0 * * * * *")
            .created_at(t0)
            .build();
        let cron_id = cron.id;
        store.add_cron_tickers(vec![cron]).await.unwrap();

        clock.advance(Duration::seconds(210));
        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.materialized, 3);
        assert_eq!(report.due, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.claimed, 1);
        dispatcher.wait_for_idle().await;

        let again = dispatcher.run_cycle().await.unwrap();
        assert_eq!(again.materialized, 0);
        assert_eq!(again.due, 0);
        assert_eq!(store.occurrence_count().await, 3);

        let newest = t0 + Duration::minutes(3);
        let mut occurrences = store.occurrences_of(cron_id).await.unwrap();
        occurrences.sort_by_key(|o| o.execution_time);
        for stale in &occurrences[..2] {
            assert_eq!(stale.status, TickerStatus::Skipped);
            assert!(stale
                .skipped_reason
                .as_deref()
                .unwrap()
                .contains(&newest.to_rfc3339()));
        }
        assert_eq!(occurrences[2].execution_time, newest);
        assert_eq!(occurrences[2].status, TickerStatus::Done);
        assert_eq!(handler.calls(), 1);

        let cron = store.get_cron_ticker(cron_id).await.unwrap().unwrap();
        assert_eq!(cron.next_occurrence, Some(t0 + Duration::minutes(4)));
    }

    #[tokio::test]
    async fn test_unregistered_function_fails_without_retry() {
        let store = Arc::new(InMemoryTickerStore::new());
        let registry = DefaultHandlerRegistry::builder()
            .register("job", Arc::new(CountingHandler::new()))
            .build()
            .unwrap();
        let node = build_node(
            test_config("node-a", 4),
            store.clone(),
            registry,
            Arc::new(SystemClock),
        );
        let dispatcher = node.dispatcher();

        let ticker = TimeTickerBuilder::new("missing")
            .with_retries(3, vec![1])
            .build();
        store.add_time_tickers(vec![ticker.clone()]).await.unwrap();

        dispatcher.run_cycle().await.unwrap();
        dispatcher.wait_for_idle().await;

        let row = store.get_time_ticker(ticker.id).await.unwrap().unwrap();
        assert_eq!(row.status, TickerStatus::Failed);
        assert_eq!(row.retry_count, 0);
        assert!(row.exception_message.unwrap().contains("missing"));
    }
}
