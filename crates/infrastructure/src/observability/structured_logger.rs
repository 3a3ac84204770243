//! Structured logging utilities
//!
//! Event-named records for the scheduling lifecycle. Every record carries an
//! `event` field so log pipelines can filter on it.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ticker_core::models::{TickerKind, TickerStatus};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_ticker_claimed(
        kind: TickerKind,
        ticker_id: Uuid,
        function: &str,
        node_id: &str,
        execution_time: DateTime<Utc>,
    ) {
        info!(
            event = "ticker_claimed",
            ticker.kind = %kind,
            ticker.id = %ticker_id,
            ticker.function = function,
            ticker.execution_time = %execution_time,
            node.id = node_id,
            "Ticker claimed for execution"
        );
    }

    pub fn log_ticker_completed(
        kind: TickerKind,
        ticker_id: Uuid,
        function: &str,
        status: TickerStatus,
        elapsed_ms: i64,
        error_message: Option<&str>,
    ) {
        match status {
            TickerStatus::Failed => error!(
                event = "ticker_completed",
                ticker.kind = %kind,
                ticker.id = %ticker_id,
                ticker.function = function,
                ticker.status = %status,
                ticker.elapsed_ms = elapsed_ms,
                ticker.error = error_message.unwrap_or("Unknown error"),
                "Ticker failed permanently"
            ),
            TickerStatus::Cancelled | TickerStatus::Skipped => warn!(
                event = "ticker_completed",
                ticker.kind = %kind,
                ticker.id = %ticker_id,
                ticker.function = function,
                ticker.status = %status,
                ticker.elapsed_ms = elapsed_ms,
                ticker.reason = error_message,
                "Ticker finished without running to completion"
            ),
            _ => info!(
                event = "ticker_completed",
                ticker.kind = %kind,
                ticker.id = %ticker_id,
                ticker.function = function,
                ticker.status = %status,
                ticker.elapsed_ms = elapsed_ms,
                "Ticker completed successfully"
            ),
        }
    }

    pub fn log_ticker_retry_scheduled(
        kind: TickerKind,
        ticker_id: Uuid,
        function: &str,
        retry_count: i32,
        max_retries: i32,
        next_due: DateTime<Utc>,
        reason: &str,
    ) {
        warn!(
            event = "ticker_retry_scheduled",
            ticker.kind = %kind,
            ticker.id = %ticker_id,
            ticker.function = function,
            ticker.retry_count = retry_count,
            ticker.max_retries = max_retries,
            ticker.next_due = %next_due,
            ticker.retry_reason = reason,
            "Ticker retry scheduled"
        );
    }

    pub fn log_claim_lost(kind: TickerKind, ticker_id: Uuid, node_id: &str) {
        warn!(
            event = "claim_lost",
            ticker.kind = %kind,
            ticker.id = %ticker_id,
            node.id = node_id,
            "Result discarded: ticker is no longer held by this node"
        );
    }

    pub fn log_child_queued(parent_id: Uuid, child_id: Uuid, parent_status: TickerStatus) {
        debug!(
            event = "child_queued",
            ticker.parent_id = %parent_id,
            ticker.id = %child_id,
            parent.status = %parent_status,
            "Child ticker queued by run condition"
        );
    }

    pub fn log_node_reclaimed(dead_node: &str, reclaimed: u64, by_node: &str) {
        warn!(
            event = "node_reclaimed",
            node.dead = dead_node,
            node.id = by_node,
            reclaimed.count = reclaimed,
            "Reclaimed tickers from dead node"
        );
    }

    pub fn log_cycle_failed(node_id: &str, stage: &str, error: &dyn std::error::Error) {
        error!(
            event = "cycle_failed",
            node.id = node_id,
            cycle.stage = stage,
            error.message = %error,
            "Dispatcher cycle aborted"
        );
    }
}
