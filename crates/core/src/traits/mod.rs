pub mod coordination;
pub mod handler;
pub mod store;

pub use coordination::*;
pub use handler::*;
pub use store::*;
