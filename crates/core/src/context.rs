use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    models::{DueTicker, TickerKind, TickerRequest},
    SchedulerError, SchedulerResult,
};

/// 处理函数观察到取消信号时返回的错误
///
/// 处理函数通过 `context.check_cancelled()?` 把它向上传播，
/// 执行引擎据此把任务标记为 `Cancelled` 而不是进入重试。
/// 收到取消信号后正常返回 `Ok(())` 同样记为 `Cancelled`。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("ticker cancellation requested")]
pub struct CancellationRequested;

/// 处理函数的执行上下文
#[derive(Debug, Clone)]
pub struct TickerContext {
    id: Uuid,
    kind: TickerKind,
    function: String,
    cron_ticker_id: Option<Uuid>,
    retry_count: i32,
    scheduled_at: DateTime<Utc>,
    request: Option<TickerRequest>,
    node_id: String,
    cancellation: CancellationToken,
}

impl TickerContext {
    pub fn new(ticker: &DueTicker, node_id: &str, cancellation: CancellationToken) -> Self {
        Self {
            id: ticker.id,
            kind: ticker.kind,
            function: ticker.function.clone(),
            cron_ticker_id: ticker.cron_ticker_id,
            retry_count: ticker.retry_count,
            scheduled_at: ticker.execution_time,
            request: ticker.request.clone(),
            node_id: node_id.to_string(),
            cancellation,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TickerKind {
        self.kind
    }

    pub fn function_name(&self) -> &str {
        &self.function
    }

    pub fn cron_ticker_id(&self) -> Option<Uuid> {
        self.cron_ticker_id
    }

    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    /// 计划触发时间，而不是实际开始时间
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn raw_request(&self) -> Option<&TickerRequest> {
        self.request.as_ref()
    }

    /// 按需反序列化请求负载
    pub fn request<T: DeserializeOwned>(&self) -> SchedulerResult<T> {
        match &self.request {
            Some(request) => request.decode(),
            None => Err(SchedulerError::validation(format!(
                "ticker {} has no request payload",
                self.id
            ))),
        }
    }

    pub fn request_cancellation(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), CancellationRequested> {
        if self.cancellation.is_cancelled() {
            Err(CancellationRequested)
        } else {
            Ok(())
        }
    }

    /// 等待取消信号，供处理函数在 `tokio::select!` 中使用
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}
