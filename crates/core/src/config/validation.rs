use crate::{SchedulerError, SchedulerResult};

/// 配置段的自校验
pub trait ConfigValidator {
    fn validate(&self) -> SchedulerResult<()>;
}

/// 通用校验工具
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field_name: &str) -> SchedulerResult<()> {
        if value.trim().is_empty() {
            return Err(SchedulerError::config_error(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    pub fn validate_positive(value: u64, field_name: &str) -> SchedulerResult<()> {
        if value == 0 {
            return Err(SchedulerError::config_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        Ok(())
    }

    pub fn validate_count(count: usize, field_name: &str, max: usize) -> SchedulerResult<()> {
        if count == 0 {
            return Err(SchedulerError::config_error(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(SchedulerError::config_error(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    pub fn validate_one_of(value: &str, field_name: &str, allowed: &[&str]) -> SchedulerResult<()> {
        if !allowed.contains(&value) {
            return Err(SchedulerError::config_error(format!(
                "Invalid {field_name}: {value}. Valid options: {allowed:?}"
            )));
        }
        Ok(())
    }
}
