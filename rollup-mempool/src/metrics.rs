//! Prometheus metrics for the admission core
//!
//! # Metrics
//!
//! - `mempool_tx_admitted_total{tx_type}` - Admitted transactions and stored offers
//! - `mempool_tx_rejected_total{kind}` - Rejected submissions by error kind
//! - `mempool_submit_duration_seconds` - End-to-end submission latency
//! - `mempool_lock_wait_seconds` - Time spent acquiring resource locks
//! - `mempool_pending_txs` - Pending mempool transactions

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
///
/// Every collector lives in its own [`Registry`], so several mempools can
/// coexist in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Admitted submissions by transaction type
    pub admitted_total: IntCounterVec,

    /// Rejected submissions by error kind
    pub rejected_total: IntCounterVec,

    /// Submission latency histogram
    pub submit_duration: Histogram,

    /// Lock wait histogram
    pub lock_wait: Histogram,

    /// Pending mempool transactions
    pub pending_txs: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("pending_txs", &self.pending_txs.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let admitted_total = IntCounterVec::new(
            Opts::new("mempool_tx_admitted_total", "Admitted transactions and stored offers"),
            &["tx_type"],
        )?;
        registry.register(Box::new(admitted_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new("mempool_tx_rejected_total", "Rejected submissions by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let submit_duration = Histogram::with_opts(
            HistogramOpts::new("mempool_submit_duration_seconds", "End-to-end submission latency")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(submit_duration.clone()))?;

        let lock_wait = Histogram::with_opts(
            HistogramOpts::new("mempool_lock_wait_seconds", "Time spent acquiring resource locks")
                .buckets(vec![0.0001, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 3.0]),
        )?;
        registry.register(Box::new(lock_wait.clone()))?;

        let pending_txs = IntGauge::new("mempool_pending_txs", "Pending mempool transactions")?;
        registry.register(Box::new(pending_txs.clone()))?;

        Ok(Self {
            admitted_total,
            rejected_total,
            submit_duration,
            lock_wait,
            pending_txs,
            registry,
        })
    }

    /// Record an admission
    pub fn record_admitted(&self, tx_type: &str) {
        self.admitted_total.with_label_values(&[tx_type]).inc();
    }

    /// Record a rejection
    pub fn record_rejected(&self, kind: &str) {
        self.rejected_total.with_label_values(&[kind]).inc();
    }

    /// Record submission latency
    pub fn record_submit_duration(&self, duration_seconds: f64) {
        self.submit_duration.observe(duration_seconds);
    }

    /// Record lock wait
    pub fn record_lock_wait(&self, duration_seconds: f64) {
        self.lock_wait.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every metric
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
