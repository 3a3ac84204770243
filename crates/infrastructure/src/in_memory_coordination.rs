use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use ticker_core::{
    models::NodeHeartbeat, traits::CoordinationStore, SchedulerError, SchedulerResult,
};

/// 内存协调存储，节点心跳表
///
/// `set_available(false)` 模拟协调存储不可达，所有调用返回
/// [`SchedulerError::Coordination`]。
#[derive(Debug, Clone)]
pub struct InMemoryCoordinationStore {
    nodes: Arc<RwLock<HashMap<String, NodeHeartbeat>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> SchedulerResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SchedulerError::Coordination(
                "coordination store unreachable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn heartbeat(&self, node_id: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        self.ensure_available()?;
        let mut nodes = self.nodes.write().await;
        nodes
            .entry(node_id.to_string())
            .and_modify(|hb| hb.last_heartbeat = now)
            .or_insert_with(|| NodeHeartbeat::new(node_id, now));
        debug!("Heartbeat recorded for node {}", node_id);
        Ok(())
    }

    async fn list_dead_nodes(
        &self,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<String>> {
        self.ensure_available()?;
        let nodes = self.nodes.read().await;
        let mut dead: Vec<String> = nodes
            .values()
            .filter(|hb| hb.is_expired(ttl, now))
            .map(|hb| hb.node_id.clone())
            .collect();
        dead.sort();
        Ok(dead)
    }

    async fn remove_node(&self, node_id: &str) -> SchedulerResult<bool> {
        self.ensure_available()?;
        Ok(self.nodes.write().await.remove(node_id).is_some())
    }

    async fn list_nodes(&self) -> SchedulerResult<Vec<NodeHeartbeat>> {
        self.ensure_available()?;
        let mut nodes: Vec<NodeHeartbeat> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heartbeat_keeps_first_seen() {
        let store = InMemoryCoordinationStore::new();
        let t0 = Utc::now();
        store.heartbeat("node-a", t0).await.unwrap();
        store
            .heartbeat("node-a", t0 + Duration::seconds(10))
            .await
            .unwrap();

        let nodes = store.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].first_seen, t0);
        assert_eq!(nodes[0].last_heartbeat, t0 + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_dead_nodes_by_ttl() {
        let store = InMemoryCoordinationStore::new();
        let t0 = Utc::now();
        store.heartbeat("stale", t0).await.unwrap();
        store
            .heartbeat("fresh", t0 + Duration::seconds(50))
            .await
            .unwrap();

        let now = t0 + Duration::seconds(61);
        let dead = store
            .list_dead_nodes(Duration::seconds(60), now)
            .await
            .unwrap();
        assert_eq!(dead, vec!["stale".to_string()]);

        assert!(store.remove_node("stale").await.unwrap());
        assert!(!store.remove_node("stale").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_coordination_error() {
        let store = InMemoryCoordinationStore::new();
        store.set_available(false);
        let err = store.heartbeat("node-a", Utc::now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Coordination(_)));
        assert!(err.is_retryable());

        store.set_available(true);
        assert!(store.heartbeat("node-a", Utc::now()).await.is_ok());
    }
}
