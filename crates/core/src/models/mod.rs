//! # 数据模型
//!
//! 调度引擎的核心数据结构：一次性任务 [`TimeTicker`]、周期任务 [`CronTicker`]
//! 及其物化触发 [`CronTickerOccurrence`]、节点心跳 [`NodeHeartbeat`]。
//!
//! 所有时间字段使用 `DateTime<Utc>`，状态字段使用枚举，避免无效状态。
//! 父子关系只以 id 互相引用，不持有对方的结构。
//!
//! ## 状态流转
//!
//! ```text
//! Idle → Queued → InProgress → Done | DueDone | Failed | Cancelled | Skipped
//!                     ↓
//!                  Queued   (重试 / 失效节点回收)
//! ```

pub mod cron_ticker;
pub mod due_ticker;
pub mod node;
pub mod operation_result;
pub mod request;
pub mod ticker;
pub mod time_ticker;

pub use cron_ticker::*;
pub use due_ticker::*;
pub use node::*;
pub use operation_result::*;
pub use request::*;
pub use ticker::*;
pub use time_ticker::*;
