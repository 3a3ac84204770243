use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 节点心跳记录，每个节点只写自己的那一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeHeartbeat {
    pub node_id: String,
    pub last_heartbeat: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
}

impl NodeHeartbeat {
    pub fn new(node_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            last_heartbeat: now,
            first_seen: now,
        }
    }

    /// 最近一次心跳早于 `now - ttl` 即视为失效
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_heartbeat > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_heartbeat_expiry_boundary() {
        let now = Utc::now();
        let heartbeat = NodeHeartbeat::new("node-a", now - Duration::seconds(30));

        assert!(!heartbeat.is_expired(Duration::seconds(30), now));
        assert!(heartbeat.is_expired(Duration::seconds(29), now));
    }
}
