pub mod clock;
pub mod config;
pub mod context;
pub mod errors;
pub mod handler_registry;
pub mod models;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use config::AppConfig;
pub use context::{CancellationRequested, TickerContext};
pub use errors::{SchedulerError, SchedulerResult};
pub use handler_registry::{DefaultHandlerRegistry, FnHandler, HandlerRegistryBuilder};
pub use models::*;
pub use traits::*;
