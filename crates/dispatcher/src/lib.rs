//! 调度节点
//!
//! 把核心模型、执行引擎和存储装配成一个可运行的节点：
//!
//! - [`scheduler::Dispatcher`] 固定间隔轮询，物化 CRON 触发并抢占到期任务；
//! - [`outcome_handler::OutcomeHandler`] 把执行结果写回存储，驱动重试和链式子任务；
//! - [`cluster_coordinator::ClusterCoordinator`] 维护心跳并回收失效节点的任务；
//! - [`manager::TickerManager`] 是对外的调度 API；
//! - [`node::TickerNode`] 按 [`ticker_core::AppConfig`] 组装以上组件。

pub mod cluster_coordinator;
pub mod cron_utils;
pub mod dependency_checker;
pub mod manager;
pub mod node;
pub mod outcome_handler;
pub mod retry_service;
pub mod scheduler;
pub mod strategies;

pub use cluster_coordinator::{ClusterCoordinator, ReclaimReport};
pub use cron_utils::CronScheduler;
pub use dependency_checker::{DependencyCheckService, DependencyChecker};
pub use manager::TickerManager;
pub use node::TickerNode;
pub use outcome_handler::{AppliedOutcome, OutcomeHandler};
pub use retry_service::{RetryDecision, RetryPolicy, RetryService, TickerRetryService};
pub use scheduler::{CycleReport, Dispatcher};
pub use strategies::{mark_superseded, DispatchPlan, DispatchStrategy, PriorityStrategy};
