//! # Ticker Testing Utils
//!
//! Shared testing utilities for the ticker workspace: data builders,
//! scripted handlers and a manually driven clock.
//!
//! ```toml
//! [dev-dependencies]
//! ticker-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod handlers;
pub mod helpers;

pub use builders::*;
pub use handlers::*;
pub use helpers::*;
