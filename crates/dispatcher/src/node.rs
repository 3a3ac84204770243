use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ticker_core::{
    clock::Clock,
    traits::{CoordinationStore, HandlerRegistry, TickerStore},
    AppConfig, SchedulerResult,
};
use ticker_infrastructure::MetricsCollector;
use ticker_worker::TickerExecutionManager;

use crate::cluster_coordinator::ClusterCoordinator;
use crate::dependency_checker::{DependencyCheckService, DependencyChecker};
use crate::manager::TickerManager;
use crate::outcome_handler::OutcomeHandler;
use crate::retry_service::{RetryPolicy, RetryService, TickerRetryService};
use crate::scheduler::Dispatcher;
use crate::strategies::PriorityStrategy;

/// 一个调度节点的全部组件，按配置装配
pub struct TickerNode {
    node_id: String,
    config: AppConfig,
    manager: Arc<TickerManager>,
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<ClusterCoordinator>,
    store: Arc<dyn TickerStore>,
}

impl TickerNode {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn TickerStore>,
        coordination: Arc<dyn CoordinationStore>,
        registry: Arc<dyn HandlerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let node_id = config.node.resolve_node_id();
        let metrics = Arc::new(MetricsCollector::new(config.observability.metrics_enabled));

        let executor = Arc::new(TickerExecutionManager::new(
            node_id.clone(),
            registry,
            Arc::clone(&clock),
        ));
        let dependency_checker: Arc<dyn DependencyCheckService> = Arc::new(
            DependencyChecker::new(Arc::clone(&store), config.chain.max_chain_depth),
        );
        let retry_service: Arc<dyn RetryService> = Arc::new(TickerRetryService::new(
            node_id.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
            RetryPolicy::from_config(&config.retry),
        ));
        let outcome_handler = Arc::new(OutcomeHandler::new(
            node_id.clone(),
            Arc::clone(&store),
            retry_service,
            Arc::clone(&dependency_checker),
            Arc::clone(&metrics),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            config.dispatcher.clone(),
            Arc::clone(&store),
            Arc::clone(&executor),
            outcome_handler,
            Arc::clone(&dependency_checker),
            Arc::new(PriorityStrategy::new()),
            Arc::clone(&clock),
            Arc::clone(&metrics),
        ));
        let coordinator = Arc::new(ClusterCoordinator::new(
            node_id.clone(),
            Arc::clone(&store),
            coordination,
            Arc::clone(&clock),
            config.cluster.clone(),
            metrics,
        ));
        let manager = Arc::new(TickerManager::new(
            Arc::clone(&store),
            executor,
            dependency_checker,
            clock,
        ));

        Self {
            node_id,
            config,
            manager,
            dispatcher,
            coordinator,
            store,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn manager(&self) -> Arc<TickerManager> {
        Arc::clone(&self.manager)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn coordinator(&self) -> Arc<ClusterCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn store(&self) -> Arc<dyn TickerStore> {
        Arc::clone(&self.store)
    }

    /// 注册心跳、回收本节点遗留任务，然后启动心跳、失效检测与调度循环
    pub async fn start(
        &self,
        shutdown: &broadcast::Sender<()>,
    ) -> SchedulerResult<Vec<JoinHandle<()>>> {
        info!("启动调度节点: {}", self.node_id);
        if let Err(e) = self.coordinator.heartbeat().await {
            warn!("首次心跳写入失败，稍后重试: {}", e);
        }
        if self.config.cluster.reclaim_own_on_startup {
            self.coordinator.recover_own_orphans().await?;
        }

        let mut handles = Arc::clone(&self.coordinator).start(shutdown);
        if self.config.dispatcher.enabled {
            let dispatcher = Arc::clone(&self.dispatcher);
            handles.push(tokio::spawn(dispatcher.run(shutdown.subscribe())));
        } else {
            info!("调度循环已在配置中关闭，本节点只接受管理请求");
        }
        Ok(handles)
    }

    /// 等待已派发的执行全部落库
    pub async fn drain(&self) {
        self.dispatcher.wait_for_idle().await;
        info!("节点 {} 的在途任务已全部结束", self.node_id);
    }
}
