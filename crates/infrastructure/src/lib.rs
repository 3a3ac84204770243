pub mod in_memory_coordination;
pub mod in_memory_store;
pub mod observability;

pub use in_memory_coordination::InMemoryCoordinationStore;
pub use in_memory_store::InMemoryTickerStore;
pub use observability::*;
