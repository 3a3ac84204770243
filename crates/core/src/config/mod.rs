pub mod app_config;
pub mod models;
pub mod validation;

pub use app_config::AppConfig;
pub use models::*;
pub use validation::{ConfigValidator, ValidationUtils};
