use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use ticker_core::{
    clock::Clock,
    config::ClusterConfig,
    traits::{CoordinationStore, TickerStore},
    SchedulerResult,
};
use ticker_infrastructure::{MetricsCollector, StructuredLogger};
use ticker_worker::HeartbeatManager;

/// 一次失效检测的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// (失效节点, 回收的行数)
    pub reclaimed: Vec<(String, u64)>,
    pub errors: Vec<String>,
}

impl ReclaimReport {
    pub fn total_reclaimed(&self) -> u64 {
        self.reclaimed.iter().map(|(_, n)| n).sum()
    }
}

/// 集群协调：心跳、失效节点检测与任务回收
///
/// 只负责活性，安全性由存储层的原子抢占保证。重复回收同一失效节点是幂等的。
pub struct ClusterCoordinator {
    node_id: String,
    store: Arc<dyn TickerStore>,
    coordination: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    config: ClusterConfig,
    heartbeat: Arc<HeartbeatManager>,
    metrics: Arc<MetricsCollector>,
}

impl ClusterCoordinator {
    pub fn new(
        node_id: String,
        store: Arc<dyn TickerStore>,
        coordination: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
        config: ClusterConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let heartbeat = Arc::new(HeartbeatManager::new(
            node_id.clone(),
            Arc::clone(&coordination),
            Arc::clone(&clock),
            config.heartbeat_interval(),
        ));
        Self {
            node_id,
            store,
            coordination,
            clock,
            config,
            heartbeat,
            metrics,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub async fn heartbeat(&self) -> SchedulerResult<()> {
        self.heartbeat.beat().await
    }

    /// 启动时回收本节点标识下遗留的 `InProgress` 行
    pub async fn recover_own_orphans(&self) -> SchedulerResult<u64> {
        let reclaimed = self.store.reclaim_locked_by(&self.node_id).await?;
        if reclaimed > 0 {
            info!(
                "节点 {} 启动时回收了 {} 个遗留任务",
                self.node_id, reclaimed
            );
            self.metrics.record_reclaim(reclaimed);
        }
        Ok(reclaimed)
    }

    /// 检测失效节点并回收它们锁定的任务
    ///
    /// 协调存储不可用时直接返回错误，不做任何回收。
    pub async fn detect_and_reclaim(&self) -> SchedulerResult<ReclaimReport> {
        let now = self.clock.now();
        let dead_nodes = self
            .coordination
            .list_dead_nodes(self.config.node_ttl(), now)
            .await?;

        let mut report = ReclaimReport::default();
        for dead in dead_nodes.into_iter().filter(|n| *n != self.node_id) {
            warn!("检测到失效节点: {}", dead);
            let reclaimed = match self.store.reclaim_locked_by(&dead).await {
                Ok(n) => n,
                Err(e) => {
                    error!("回收失效节点 {} 的任务失败: {}", dead, e);
                    report.errors.push(format!("{dead}: {e}"));
                    continue;
                }
            };
            if let Err(e) = self.coordination.remove_node(&dead).await {
                error!("移除失效节点 {} 的心跳记录失败: {}", dead, e);
                report.errors.push(format!("{dead}: {e}"));
            }
            StructuredLogger::log_node_reclaimed(&dead, reclaimed, &self.node_id);
            self.metrics.record_reclaim(reclaimed);
            report.reclaimed.push((dead, reclaimed));
        }

        if report.reclaimed.is_empty() {
            debug!("没有检测到失效节点");
        }
        Ok(report)
    }

    /// 启动心跳任务与失效检测循环，收到关闭信号后退出
    pub fn start(self: Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let heartbeat_handle = Arc::clone(&self.heartbeat).start_heartbeat_task(shutdown.subscribe());

        let mut shutdown_rx = shutdown.subscribe();
        let coordinator = Arc::clone(&self);
        let detection_handle = tokio::spawn(async move {
            info!("启动节点失效检测循环: {}", coordinator.node_id);
            let mut ticker = interval(coordinator.config.detection_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.detect_and_reclaim().await {
                            error!("节点失效检测时出错: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("收到停止信号，退出节点失效检测循环");
                        break;
                    }
                }
            }
        });

        vec![heartbeat_handle, detection_handle]
    }
}
