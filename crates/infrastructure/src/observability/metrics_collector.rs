//! Metrics collector for the ticker scheduler
//!
//! Records through the `metrics` facade. No exporter is installed here; the
//! host application decides where the numbers go.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

use ticker_core::models::{TickerKind, TickerStatus};

pub struct MetricsCollector {
    enabled: bool,

    // Dispatcher
    cycles_total: Counter,
    cycle_duration: Histogram,
    occurrences_materialized_total: Counter,
    tickers_claimed_total: Counter,
    claim_conflicts_total: Counter,
    tickers_deferred_total: Counter,

    // Execution
    running_tickers: Gauge,
    execution_duration: Histogram,
    tickers_retried_total: Counter,
    claims_lost_total: Counter,
    writebacks_released_total: Counter,

    // Cluster
    nodes_reclaimed_total: Counter,
    tickers_reclaimed_total: Counter,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            cycles_total: counter!("ticker_dispatcher_cycles_total"),
            cycle_duration: histogram!("ticker_dispatcher_cycle_duration_seconds"),
            occurrences_materialized_total: counter!("ticker_occurrences_materialized_total"),
            tickers_claimed_total: counter!("ticker_claimed_total"),
            claim_conflicts_total: counter!("ticker_claim_conflicts_total"),
            tickers_deferred_total: counter!("ticker_deferred_total"),
            running_tickers: gauge!("ticker_running"),
            execution_duration: histogram!("ticker_execution_duration_seconds"),
            tickers_retried_total: counter!("ticker_retried_total"),
            claims_lost_total: counter!("ticker_claims_lost_total"),
            writebacks_released_total: counter!("ticker_writebacks_released_total"),
            nodes_reclaimed_total: counter!("ticker_nodes_reclaimed_total"),
            tickers_reclaimed_total: counter!("ticker_reclaimed_total"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_cycle(
        &self,
        duration_seconds: f64,
        materialized: u64,
        claimed: u64,
        conflicts: u64,
        deferred: u64,
    ) {
        if !self.enabled {
            return;
        }
        self.cycles_total.increment(1);
        self.cycle_duration.record(duration_seconds);
        self.occurrences_materialized_total.increment(materialized);
        self.tickers_claimed_total.increment(claimed);
        self.claim_conflicts_total.increment(conflicts);
        self.tickers_deferred_total.increment(deferred);
    }

    pub fn record_execution(&self, kind: TickerKind, status: TickerStatus, duration_seconds: f64) {
        if !self.enabled {
            return;
        }
        self.execution_duration.record(duration_seconds);
        counter!(
            "ticker_completed_total",
            "kind" => kind.to_string(),
            "status" => status.as_str()
        )
        .increment(1);
    }

    pub fn record_retry(&self, function: &str) {
        if !self.enabled {
            return;
        }
        self.tickers_retried_total.increment(1);
        counter!("ticker_retries_by_function_total", "function" => function.to_string())
            .increment(1);
    }

    pub fn record_claim_lost(&self) {
        if self.enabled {
            self.claims_lost_total.increment(1);
        }
    }

    /// Write-back gave up and the claim was released back to the queue
    pub fn record_writeback_released(&self) {
        if self.enabled {
            self.writebacks_released_total.increment(1);
        }
    }

    pub fn update_running(&self, running: usize) {
        if self.enabled {
            self.running_tickers.set(running as f64);
        }
    }

    pub fn record_reclaim(&self, reclaimed: u64) {
        if !self.enabled {
            return;
        }
        self.nodes_reclaimed_total.increment(1);
        self.tickers_reclaimed_total.increment(reclaimed);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}
