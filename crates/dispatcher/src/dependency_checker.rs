use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use ticker_core::{
    models::{NewTimeTicker, TickerKind, TickerStatus, TimeTicker},
    traits::TickerStore,
    SchedulerError, SchedulerResult,
};
use ticker_infrastructure::StructuredLogger;

/// 父子链式任务的校验与触发
///
/// 子任务在父任务状态变化时按运行条件从 `Idle` 迁移到 `Queued`；
/// 条件不满足的子任务永久停留在 `Idle`。
#[async_trait]
pub trait DependencyCheckService: Send + Sync {
    /// 创建前校验：嵌套深度和父链上的环
    async fn validate_new_chain(
        &self,
        parent_id: Option<Uuid>,
        spec: &NewTimeTicker,
    ) -> SchedulerResult<()>;

    /// 更新前校验：把 `ticker_id` 挂到 `new_parent` 之下是否成环或超深
    async fn validate_reparent(
        &self,
        ticker_id: Uuid,
        new_parent: Option<Uuid>,
    ) -> SchedulerResult<()>;

    /// 父任务进入 `InProgress` 时触发 `InProgress` 条件的子任务
    async fn on_parent_started(&self, parent_id: Uuid) -> SchedulerResult<Vec<Uuid>>;

    /// 父任务进入终态时触发条件满足的子任务
    async fn on_parent_completed(
        &self,
        parent_id: Uuid,
        status: TickerStatus,
    ) -> SchedulerResult<Vec<Uuid>>;
}

pub struct DependencyChecker {
    store: Arc<dyn TickerStore>,
    max_chain_depth: usize,
}

impl DependencyChecker {
    pub fn new(store: Arc<dyn TickerStore>, max_chain_depth: usize) -> Self {
        Self {
            store,
            max_chain_depth,
        }
    }

    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    /// 从 `start` 沿父链向上走，返回经过的祖先数（含 `start` 本身）。
    /// 遇到 `forbidden` 或重复节点即判定成环。
    async fn ancestry_len(&self, start: Uuid, forbidden: Option<Uuid>) -> SchedulerResult<usize> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut current = Some(start);
        let mut len = 0;

        while let Some(id) = current {
            if Some(id) == forbidden || !visited.insert(id) {
                warn!("检测到循环链式依赖，涉及 ticker {}", id);
                return Err(SchedulerError::CircularChain);
            }
            let ticker = self
                .store
                .get_time_ticker(id)
                .await?
                .ok_or_else(|| SchedulerError::ticker_not_found(id))?;
            len += 1;
            if len > self.max_chain_depth {
                return Err(SchedulerError::ChainDepthExceeded {
                    max: self.max_chain_depth,
                });
            }
            current = ticker.parent_id;
        }
        Ok(len)
    }

    /// 以 `root` 为根的已有子树的层数（含根）
    async fn subtree_height(&self, root: Uuid) -> SchedulerResult<usize> {
        let mut visited: HashSet<Uuid> = HashSet::from([root]);
        let mut level = vec![root];
        let mut height = 0;

        while !level.is_empty() {
            height += 1;
            let mut next = Vec::new();
            for id in level {
                for child in self.store.children_of(id).await? {
                    if !visited.insert(child.id) {
                        return Err(SchedulerError::CircularChain);
                    }
                    next.push(child.id);
                }
            }
            level = next;
        }
        Ok(height)
    }

    async fn queue_matching_children<F>(
        &self,
        parent_id: Uuid,
        parent_status: TickerStatus,
        matches: F,
    ) -> SchedulerResult<Vec<Uuid>>
    where
        F: Fn(&TimeTicker) -> bool + Send + Sync,
    {
        let mut queued = Vec::new();
        for child in self.store.children_of(parent_id).await? {
            if child.status != TickerStatus::Idle || !matches(&child) {
                continue;
            }
            // 并发的父任务状态变化只会有一次迁移成功
            if self
                .store
                .transition(
                    TickerKind::Time,
                    child.id,
                    TickerStatus::Idle,
                    TickerStatus::Queued,
                )
                .await?
            {
                StructuredLogger::log_child_queued(parent_id, child.id, parent_status);
                queued.push(child.id);
            }
        }
        if !queued.is_empty() {
            debug!(
                "父任务 {} 状态 {} 触发了 {} 个子任务",
                parent_id,
                parent_status,
                queued.len()
            );
        }
        Ok(queued)
    }
}

#[async_trait]
impl DependencyCheckService for DependencyChecker {
    async fn validate_new_chain(
        &self,
        parent_id: Option<Uuid>,
        spec: &NewTimeTicker,
    ) -> SchedulerResult<()> {
        let ancestors = match parent_id {
            Some(parent) => self.ancestry_len(parent, None).await?,
            None => 0,
        };
        if ancestors + spec.depth() > self.max_chain_depth {
            return Err(SchedulerError::ChainDepthExceeded {
                max: self.max_chain_depth,
            });
        }
        Ok(())
    }

    async fn validate_reparent(
        &self,
        ticker_id: Uuid,
        new_parent: Option<Uuid>,
    ) -> SchedulerResult<()> {
        let Some(parent) = new_parent else {
            return Ok(());
        };
        if parent == ticker_id {
            return Err(SchedulerError::CircularChain);
        }
        let ancestors = self.ancestry_len(parent, Some(ticker_id)).await?;
        let height = self.subtree_height(ticker_id).await?;
        if ancestors + height > self.max_chain_depth {
            return Err(SchedulerError::ChainDepthExceeded {
                max: self.max_chain_depth,
            });
        }
        Ok(())
    }

    async fn on_parent_started(&self, parent_id: Uuid) -> SchedulerResult<Vec<Uuid>> {
        self.queue_matching_children(parent_id, TickerStatus::InProgress, |child| {
            child.run_condition.is_some_and(|c| c.fires_on_start())
        })
        .await
    }

    async fn on_parent_completed(
        &self,
        parent_id: Uuid,
        status: TickerStatus,
    ) -> SchedulerResult<Vec<Uuid>> {
        if !status.is_terminal() {
            return Ok(Vec::new());
        }
        self.queue_matching_children(parent_id, status, |child| {
            child
                .run_condition
                .is_some_and(|c| !c.fires_on_start() && c.is_satisfied_by(status))
        })
        .await
    }
}
