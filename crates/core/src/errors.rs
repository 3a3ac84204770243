use thiserror::Error;
use uuid::Uuid;

/// 调度器错误类型定义
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("Ticker未找到: {id}")]
    TickerNotFound { id: Uuid },

    #[error("处理函数未注册: {name}")]
    FunctionNotFound { name: String },

    #[error("检测到循环链式依赖")]
    CircularChain,

    #[error("链式任务嵌套超过最大深度 {max}")]
    ChainDepthExceeded { max: usize },

    #[error("Ticker {id} 已被其他节点抢占")]
    ClaimConflict { id: Uuid },

    #[error("集群协调存储不可用: {0}")]
    Coordination(String),

    #[error("存储操作失败: {0}")]
    Store(String),

    #[error("数据序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务已被取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn ticker_not_found(id: Uuid) -> Self {
        Self::TickerNotFound { id }
    }

    /// 调用方在创建/更新阶段就应该看到的错误
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::Validation(_)
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::FunctionNotFound { .. }
                | SchedulerError::CircularChain
                | SchedulerError::ChainDepthExceeded { .. }
        )
    }

    /// 下一个调度周期重试即可恢复的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Coordination(_) | SchedulerError::Store(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
