pub mod components;

pub use components::{
    completion_status, ExecutionOutcome, ExecutionReport, HeartbeatManager,
    TickerExecutionManager,
};
