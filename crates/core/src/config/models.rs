use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{ConfigValidator, ValidationUtils};
use crate::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// 节点标识；为空时由主机名加随机后缀生成
    #[serde(default)]
    pub node_id: String,
}

impl NodeConfig {
    pub fn resolve_node_id(&self) -> String {
        if !self.node_id.trim().is_empty() {
            return self.node_id.trim().to_string();
        }
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "ticker".to_string());
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{host}-{}", &suffix[..8])
    }
}

impl ConfigValidator for NodeConfig {
    fn validate(&self) -> SchedulerResult<()> {
        if self.node_id.chars().any(char::is_whitespace) {
            return Err(SchedulerError::config_error(
                "node.node_id cannot contain whitespace",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// 有界执行池的并发上限，LongRunning 任务不占用
    pub max_concurrency: usize,
    /// 物化 CRON 触发时向前回看的窗口
    pub occurrence_lookback_seconds: u64,
    pub max_occurrences_per_cycle: usize,
    /// 同一 CRON 任务积压多个到期触发时，只执行最新的一个
    pub skip_superseded_occurrences: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            max_concurrency: 8,
            occurrence_lookback_seconds: 300,
            max_occurrences_per_cycle: 100,
            skip_superseded_occurrences: true,
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.occurrence_lookback_seconds as i64)
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> SchedulerResult<()> {
        ValidationUtils::validate_positive(self.poll_interval_ms, "dispatcher.poll_interval_ms")?;
        ValidationUtils::validate_count(self.max_concurrency, "dispatcher.max_concurrency", 10000)?;
        ValidationUtils::validate_count(
            self.max_occurrences_per_cycle,
            "dispatcher.max_occurrences_per_cycle",
            100_000,
        )?;
        if self.occurrence_lookback_seconds * 1000 < self.poll_interval_ms {
            return Err(SchedulerError::config_error(
                "dispatcher.occurrence_lookback_seconds must cover at least one poll interval",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub heartbeat_interval_seconds: u64,
    /// 心跳超过该时长未刷新即认为节点失效
    pub node_ttl_seconds: u64,
    pub detection_interval_seconds: u64,
    /// 启动时回收本节点标识下遗留的 InProgress 任务
    pub reclaim_own_on_startup: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 10,
            node_ttl_seconds: 60,
            detection_interval_seconds: 15,
            reclaim_own_on_startup: true,
        }
    }
}

impl ClusterConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn detection_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.detection_interval_seconds)
    }

    pub fn node_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.node_ttl_seconds as i64)
    }
}

impl ConfigValidator for ClusterConfig {
    fn validate(&self) -> SchedulerResult<()> {
        ValidationUtils::validate_positive(
            self.heartbeat_interval_seconds,
            "cluster.heartbeat_interval_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.detection_interval_seconds,
            "cluster.detection_interval_seconds",
        )?;
        if self.node_ttl_seconds <= self.heartbeat_interval_seconds {
            return Err(SchedulerError::config_error(
                "cluster.node_ttl_seconds must be greater than cluster.heartbeat_interval_seconds",
            ));
        }
        Ok(())
    }
}

/// 重试次数超出 `retry_intervals` 长度时的取值方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryIntervalOverflow {
    /// 一直使用最后一个间隔
    #[default]
    ReuseLast,
    /// 从头循环
    Cycle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// `retry_intervals` 为空时使用的间隔（秒）
    pub default_interval_seconds: u64,
    pub overflow: RetryIntervalOverflow,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: 30,
            overflow: RetryIntervalOverflow::ReuseLast,
        }
    }
}

impl ConfigValidator for RetryConfig {
    fn validate(&self) -> SchedulerResult<()> {
        ValidationUtils::validate_positive(
            self.default_interval_seconds,
            "retry.default_interval_seconds",
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub max_chain_depth: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { max_chain_depth: 5 }
    }
}

impl ConfigValidator for ChainConfig {
    fn validate(&self) -> SchedulerResult<()> {
        ValidationUtils::validate_count(self.max_chain_depth, "chain.max_chain_depth", 64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> SchedulerResult<()> {
        ValidationUtils::validate_one_of(
            &self.log_level,
            "observability.log_level",
            &["trace", "debug", "info", "warn", "error"],
        )?;
        ValidationUtils::validate_one_of(
            &self.log_format,
            "observability.log_format",
            &["json", "pretty"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_validation() {
        let config = DispatcherConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.max_concurrency = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.poll_interval_ms = 10_000;
        invalid.occurrence_lookback_seconds = 5;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_cluster_ttl_must_exceed_heartbeat() {
        let mut config = ClusterConfig::default();
        assert!(config.validate().is_ok());

        config.node_ttl_seconds = config.heartbeat_interval_seconds;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_id_resolution() {
        let explicit = NodeConfig {
            node_id: " node-7 ".to_string(),
        };
        assert_eq!(explicit.resolve_node_id(), "node-7");

        let generated = NodeConfig::default().resolve_node_id();
        assert!(!generated.is_empty());
        assert_ne!(generated, NodeConfig::default().resolve_node_id());
    }

    #[test]
    fn test_overflow_policy_serialization() {
        let json = serde_json::to_string(&RetryIntervalOverflow::ReuseLast).unwrap();
        assert_eq!(json, "\"reuse_last\"");
        let parsed: RetryIntervalOverflow = serde_json::from_str("\"cycle\"").unwrap();
        assert_eq!(parsed, RetryIntervalOverflow::Cycle);
    }

    #[test]
    fn test_observability_rejects_unknown_format() {
        let mut config = ObservabilityConfig::default();
        config.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
