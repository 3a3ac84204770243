use std::sync::Arc;
use std::time::Duration;

use ticker_core::{clock::Clock, traits::CoordinationStore, SchedulerResult};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// 周期性写入本节点心跳
pub struct HeartbeatManager {
    node_id: String,
    coordination: Arc<dyn CoordinationStore>,
    clock: Arc<dyn Clock>,
    heartbeat_interval: Duration,
}

impl HeartbeatManager {
    pub fn new(
        node_id: String,
        coordination: Arc<dyn CoordinationStore>,
        clock: Arc<dyn Clock>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            node_id,
            coordination,
            clock,
            heartbeat_interval,
        }
    }

    pub async fn beat(&self) -> SchedulerResult<()> {
        self.coordination
            .heartbeat(&self.node_id, self.clock.now())
            .await?;
        debug!("Heartbeat sent for node {}", self.node_id);
        Ok(())
    }

    pub fn start_heartbeat_task(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let mut heartbeat_interval = interval(self.heartbeat_interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = heartbeat_interval.tick() => {
                        if let Err(e) = self.beat().await {
                            error!("Failed to send heartbeat for node {}: {}", self.node_id, e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Heartbeat task for node {} shutting down", self.node_id);
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use ticker_core::models::NodeHeartbeat;
    use ticker_core::SystemClock;

    #[derive(Default)]
    struct RecordingStore {
        beats: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CoordinationStore for RecordingStore {
        async fn heartbeat(&self, node_id: &str, _now: DateTime<Utc>) -> SchedulerResult<()> {
            self.beats.lock().unwrap().push(node_id.to_string());
            Ok(())
        }

        async fn list_dead_nodes(
            &self,
            _ttl: chrono::Duration,
            _now: DateTime<Utc>,
        ) -> SchedulerResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn remove_node(&self, _node_id: &str) -> SchedulerResult<bool> {
            Ok(false)
        }

        async fn list_nodes(&self) -> SchedulerResult<Vec<NodeHeartbeat>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_heartbeat_loop_stops_on_shutdown() {
        let store = Arc::new(RecordingStore::default());
        let manager = Arc::new(HeartbeatManager::new(
            "node-a".to_string(),
            store.clone(),
            Arc::new(SystemClock),
            Duration::from_millis(10),
        ));
        let (tx, rx) = broadcast::channel(1);

        let handle = manager.start_heartbeat_task(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let beats = store.beats.lock().unwrap().clone();
        assert!(!beats.is_empty());
        assert!(beats.iter().all(|id| id == "node-a"));
    }
}
