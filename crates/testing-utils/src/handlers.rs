//! Scripted handlers for driving the execution engine in tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use ticker_core::{context::TickerContext, traits::TickerHandler};

/// Records every invocation and succeeds
#[derive(Debug, Clone, Default)]
pub struct CountingHandler {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Uuid>>>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_ids(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TickerHandler for CountingHandler {
    async fn invoke(&self, context: TickerContext) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(context.id());
        Ok(())
    }
}

/// Fails the first `failures` invocations, then succeeds.
/// `usize::MAX` never succeeds.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    failures: usize,
    attempts: Arc<AtomicUsize>,
    retry_counts: Arc<Mutex<Vec<i32>>>,
}

impl FailingHandler {
    pub fn always() -> Self {
        Self::times(usize::MAX)
    }

    pub fn times(failures: usize) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
            retry_counts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// `retry_count` observed by each invocation, in order
    pub fn observed_retry_counts(&self) -> Vec<i32> {
        self.retry_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TickerHandler for FailingHandler {
    async fn invoke(&self, context: TickerContext) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.retry_counts.lock().unwrap().push(context.retry_count());
        if attempt < self.failures {
            anyhow::bail!("scripted failure #{}", attempt + 1);
        }
        Ok(())
    }
}

/// Blocks until cancellation is requested and then reports it
#[derive(Debug, Clone, Default)]
pub struct CancellableHandler {
    started: Arc<AtomicUsize>,
}

impl CancellableHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TickerHandler for CancellableHandler {
    async fn invoke(&self, context: TickerContext) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        context.cancelled().await;
        context.check_cancelled()?;
        Ok(())
    }
}

/// Sleeps before succeeding; tracks the peak number of concurrent invocations
#[derive(Debug, Clone)]
pub struct SlowHandler {
    delay: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TickerHandler for SlowHandler {
    async fn invoke(&self, _context: TickerContext) -> anyhow::Result<()> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Panics on every invocation
#[derive(Debug, Clone, Default)]
pub struct PanickingHandler;

#[async_trait]
impl TickerHandler for PanickingHandler {
    async fn invoke(&self, _context: TickerContext) -> anyhow::Result<()> {
        panic!("scripted panic");
    }
}
