//! 演示用处理函数和示例任务

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use ticker_core::{
    models::{NewCronTicker, NewTimeTicker, RunCondition, TickerPriority, TickerRequest},
    DefaultHandlerRegistry, SchedulerResult, TickerContext,
};
use ticker_dispatcher::TickerManager;

pub const HEARTBEAT_LOG: &str = "demo.heartbeat_log";
pub const SEND_REPORT: &str = "demo.send_report";
pub const ARCHIVE_REPORT: &str = "demo.archive_report";
pub const NOTIFY_FAILURE: &str = "demo.notify_failure";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub recipient: String,
    pub fail: bool,
}

async fn heartbeat_log(context: TickerContext) -> Result<()> {
    info!(
        ticker.id = %context.id(),
        scheduled_at = %context.scheduled_at(),
        "周期任务触发"
    );
    Ok(())
}

async fn send_report(context: TickerContext) -> Result<()> {
    let request: ReportRequest = context.request()?;
    context.check_cancelled()?;
    if request.fail {
        anyhow::bail!("报表发送失败: {}", request.recipient);
    }
    info!(
        recipient = %request.recipient,
        retry_count = context.retry_count(),
        "报表已发送"
    );
    Ok(())
}

async fn archive_report(context: TickerContext) -> Result<()> {
    info!(ticker.id = %context.id(), "报表已归档");
    Ok(())
}

async fn notify_failure(context: TickerContext) -> Result<()> {
    info!(ticker.id = %context.id(), "已通知报表发送失败");
    Ok(())
}

/// 注册演示处理函数
pub fn registry() -> SchedulerResult<DefaultHandlerRegistry> {
    DefaultHandlerRegistry::builder()
        .register_fn(HEARTBEAT_LOG, heartbeat_log)
        .register_fn(SEND_REPORT, send_report)
        .register_fn(ARCHIVE_REPORT, archive_report)
        .register_fn(NOTIFY_FAILURE, notify_failure)
        .build()
}

/// 写入一个周期任务和一条带子任务的报表链
pub async fn seed(manager: &Arc<TickerManager>) -> SchedulerResult<()> {
    let cron = manager
        .add_cron_ticker(
            NewCronTicker::new(HEARTBEAT_LOG, "*/30 * * * * *").with_priority(TickerPriority::Low),
        )
        .await?;
    if let Some(e) = cron.exception {
        return Err(e);
    }

    let request = TickerRequest::encode(&ReportRequest {
        recipient: "ops@example.com".to_string(),
        fail: false,
    })?;
    let chain = NewTimeTicker::new(SEND_REPORT)
        .at(Utc::now() + Duration::seconds(5))
        .with_priority(TickerPriority::High)
        .with_retries(2, vec![5, 15])
        .with_request(request)
        .with_description("每日报表")
        .with_child(RunCondition::OnSuccess, NewTimeTicker::new(ARCHIVE_REPORT))
        .with_child(RunCondition::OnFailure, NewTimeTicker::new(NOTIFY_FAILURE));
    let result = manager.add_time_ticker(chain).await?;
    if let Some(e) = result.exception {
        return Err(e);
    }
    info!("已写入演示任务: 1 个周期任务, {} 个一次性任务", result.affected_rows);
    Ok(())
}
