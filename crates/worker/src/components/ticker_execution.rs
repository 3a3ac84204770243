use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ticker_core::{
    clock::Clock,
    context::{CancellationRequested, TickerContext},
    models::{DueTicker, TickerStatus},
    traits::HandlerRegistry,
};

/// 一次执行的结果分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// 正常返回；`status` 为 `Done` 或 `DueDone`
    Succeeded { status: TickerStatus },
    Cancelled { reason: String },
    /// 处理函数返回错误或 panic，交给重试控制
    Failed { message: String },
    FunctionNotFound { name: String },
    Skipped { reason: String },
}

impl ExecutionOutcome {
    /// 不经过重试即可落定的终态；`Failed` 需要重试控制决定
    pub fn terminal_status(&self) -> Option<TickerStatus> {
        match self {
            ExecutionOutcome::Succeeded { status } => Some(*status),
            ExecutionOutcome::Cancelled { .. } => Some(TickerStatus::Cancelled),
            ExecutionOutcome::FunctionNotFound { .. } => Some(TickerStatus::Failed),
            ExecutionOutcome::Skipped { .. } => Some(TickerStatus::Skipped),
            ExecutionOutcome::Failed { .. } => None,
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            ExecutionOutcome::Succeeded { .. } => None,
            ExecutionOutcome::Cancelled { reason } | ExecutionOutcome::Skipped { reason } => {
                Some(reason.clone())
            }
            ExecutionOutcome::Failed { message } => Some(message.clone()),
            ExecutionOutcome::FunctionNotFound { name } => {
                Some(format!("function '{name}' is not registered"))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub ticker: DueTicker,
    pub outcome: ExecutionOutcome,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
}

impl ExecutionReport {
    /// 不执行处理函数直接跳过，例如被更新的 CRON 边界取代
    pub fn skipped(ticker: DueTicker, reason: impl Into<String>) -> Self {
        Self {
            ticker,
            outcome: ExecutionOutcome::Skipped {
                reason: reason.into(),
            },
            started_at: None,
            elapsed_ms: 0,
        }
    }
}

/// 在本节点上执行已抢占的 ticker
///
/// 追踪正在运行的 ticker 与其取消令牌，供外部请求协作式取消。
pub struct TickerExecutionManager {
    node_id: String,
    registry: Arc<dyn HandlerRegistry>,
    clock: Arc<dyn Clock>,
    running: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl TickerExecutionManager {
    pub fn new(node_id: String, registry: Arc<dyn HandlerRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            node_id,
            registry,
            clock,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registry(&self) -> Arc<dyn HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    pub async fn is_running(&self, id: Uuid) -> bool {
        self.running.read().await.contains_key(&id)
    }

    /// 向本节点上正在运行的 ticker 发出取消信号；不在运行中返回 false
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.running.read().await.get(&id) {
            Some(token) => {
                token.cancel();
                info!("Cancellation requested for running ticker {}", id);
                true
            }
            None => {
                debug!("Ticker {} is not running on node {}", id, self.node_id);
                false
            }
        }
    }

    /// 登记即将执行的 ticker，之后的取消请求落到返回的令牌上
    pub async fn register_running(&self, id: Uuid) -> CancellationToken {
        self.running
            .write()
            .await
            .entry(id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// 执行一个已抢占的 ticker 并分类结果，不写存储
    pub async fn execute(&self, ticker: DueTicker) -> ExecutionReport {
        let token = self.register_running(ticker.id).await;
        self.execute_registered(ticker, token).await
    }

    /// 同 [`execute`](Self::execute)，使用 [`register_running`](Self::register_running) 预先登记的令牌
    pub async fn execute_registered(
        &self,
        ticker: DueTicker,
        token: CancellationToken,
    ) -> ExecutionReport {
        let Some(handler) = self.registry.resolve(&ticker.function) else {
            self.running.write().await.remove(&ticker.id);
            error!(
                "No handler registered for function '{}' (ticker {})",
                ticker.function, ticker.id
            );
            let name = ticker.function.clone();
            return ExecutionReport {
                ticker,
                outcome: ExecutionOutcome::FunctionNotFound { name },
                started_at: None,
                elapsed_ms: 0,
            };
        };

        if token.is_cancelled() {
            self.running.write().await.remove(&ticker.id);
            info!("Ticker {} was cancelled before it started", ticker.id);
            return ExecutionReport {
                ticker,
                outcome: ExecutionOutcome::Cancelled {
                    reason: "cancelled before start".to_string(),
                },
                started_at: None,
                elapsed_ms: 0,
            };
        }

        let context = TickerContext::new(&ticker, &self.node_id, token.clone());
        let started_at = self.clock.now();
        let started = Instant::now();
        debug!(
            "Executing ticker {} function={} retry_count={}",
            ticker.id, ticker.function, ticker.retry_count
        );

        let joined = tokio::spawn(async move { handler.invoke(context).await }).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;
        self.running.write().await.remove(&ticker.id);

        let outcome = match joined {
            Ok(Ok(())) if token.is_cancelled() => ExecutionOutcome::Cancelled {
                reason: "handler returned after cancellation was requested".to_string(),
            },
            Ok(Ok(())) => ExecutionOutcome::Succeeded {
                status: completion_status(started_at, ticker.execution_time),
            },
            Ok(Err(err)) => {
                if err.downcast_ref::<CancellationRequested>().is_some() || token.is_cancelled() {
                    ExecutionOutcome::Cancelled {
                        reason: format!("{err:#}"),
                    }
                } else {
                    warn!("Ticker {} failed: {:#}", ticker.id, err);
                    ExecutionOutcome::Failed {
                        message: format!("{err:#}"),
                    }
                }
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!("Ticker {} handler panicked: {}", ticker.id, message);
                ExecutionOutcome::Failed {
                    message: format!("handler panicked: {message}"),
                }
            }
            Err(join_err) => ExecutionOutcome::Cancelled {
                reason: join_err.to_string(),
            },
        };

        ExecutionReport {
            ticker,
            outcome,
            started_at: Some(started_at),
            elapsed_ms,
        }
    }
}

/// 在计划时间或之前开始的执行记为 `DueDone`，之后开始的记为 `Done`
pub fn completion_status(started_at: DateTime<Utc>, execution_time: DateTime<Utc>) -> TickerStatus {
    if started_at <= execution_time {
        TickerStatus::DueDone
    } else {
        TickerStatus::Done
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
