use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use ticker_core::{
    traits::{CoordinationStore, HandlerRegistry, TickerStore},
    AppConfig, SystemClock,
};
use ticker_dispatcher::{TickerManager, TickerNode};
use ticker_infrastructure::{InMemoryCoordinationStore, InMemoryTickerStore};

use crate::demo;
use crate::shutdown::ShutdownManager;

/// 应用启动选项
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// 启动后写入演示任务
    pub seed_demo: bool,
    /// 关闭时等待在途任务的上限
    pub shutdown_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            seed_demo: true,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// 主应用程序：单节点，内存存储
pub struct Application {
    node: TickerNode,
    options: AppOptions,
}

impl Application {
    pub fn new(config: AppConfig, options: AppOptions) -> Result<Self> {
        let registry: Arc<dyn HandlerRegistry> =
            Arc::new(demo::registry().context("注册处理函数失败")?);
        let store: Arc<dyn TickerStore> = Arc::new(InMemoryTickerStore::new());
        let coordination: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());

        Ok(Self::with_components(
            config,
            options,
            store,
            coordination,
            registry,
        ))
    }

    /// 用外部提供的存储和处理函数组装
    pub fn with_components(
        config: AppConfig,
        options: AppOptions,
        store: Arc<dyn TickerStore>,
        coordination: Arc<dyn CoordinationStore>,
        registry: Arc<dyn HandlerRegistry>,
    ) -> Self {
        let node = TickerNode::new(config, store, coordination, registry, Arc::new(SystemClock));
        info!("初始化应用程序，节点: {}", node.node_id());
        Self { node, options }
    }

    pub fn node_id(&self) -> &str {
        self.node.node_id()
    }

    pub fn manager(&self) -> Arc<TickerManager> {
        self.node.manager()
    }

    /// 运行直到收到关闭信号，然后在超时内等待在途任务落库
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        if shutdown.is_shutdown() {
            return Ok(());
        }
        if self.options.seed_demo {
            demo::seed(&self.node.manager())
                .await
                .context("写入演示任务失败")?;
        }

        let handles = self
            .node
            .start(shutdown.sender())
            .await
            .context("启动调度节点失败")?;

        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务异常退出: {}", e);
            }
        }

        info!("后台循环已停止，等待在途任务结束");
        if !shutdown
            .drain_with_timeout(self.node.drain(), self.options.shutdown_timeout)
            .await
        {
            warn!("仍有任务在执行，由其他节点在本节点心跳过期后回收");
        }
        Ok(())
    }
}
