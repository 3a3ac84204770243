use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{models::NodeHeartbeat, SchedulerResult};

/// 集群协调存储
///
/// 每个节点只覆盖写自己的心跳行，不需要跨节点锁。
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn heartbeat(&self, node_id: &str, now: DateTime<Utc>) -> SchedulerResult<()>;

    /// 最近心跳早于 `now - ttl` 的节点
    async fn list_dead_nodes(&self, ttl: Duration, now: DateTime<Utc>)
        -> SchedulerResult<Vec<String>>;

    async fn remove_node(&self, node_id: &str) -> SchedulerResult<bool>;

    async fn list_nodes(&self) -> SchedulerResult<Vec<NodeHeartbeat>>;
}
