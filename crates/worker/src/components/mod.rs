pub mod heartbeat_manager;
pub mod ticker_execution;

pub use heartbeat_manager::HeartbeatManager;
pub use ticker_execution::{
    completion_status, ExecutionOutcome, ExecutionReport, TickerExecutionManager,
};
