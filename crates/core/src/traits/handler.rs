//! 处理函数接口定义
//!
//! 处理函数通过显式注册得到一张 名称 → 调用器 的表，进程启动时构建一次，
//! 之后只读。调度引擎只依赖 [`HandlerRegistry::resolve`]。
//!
//! ```rust,ignore
//! struct SendReport;
//!
//! #[async_trait]
//! impl TickerHandler for SendReport {
//!     async fn invoke(&self, context: TickerContext) -> anyhow::Result<()> {
//!         let request: ReportRequest = context.request()?;
//!         context.check_cancelled()?;
//!         send(request).await
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::TickerContext;

#[async_trait]
pub trait TickerHandler: Send + Sync {
    async fn invoke(&self, context: TickerContext) -> anyhow::Result<()>;
}

pub trait HandlerRegistry: Send + Sync {
    fn resolve(&self, function: &str) -> Option<Arc<dyn TickerHandler>>;

    fn contains(&self, function: &str) -> bool;

    fn function_names(&self) -> Vec<String>;
}
