pub mod app;
pub mod demo;
pub mod shutdown;
