//! # Prometheus Metrics
//!
//! Operational counters for a coordinator: how many proposals came in, how
//! many approvals were accepted or turned away (and why), how executions
//! went.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] prefixed
//! `cosign_`, so embedding a coordinator never collides with the host
//! process's own metrics. Whoever owns the HTTP surface calls
//! [`CoordinatorMetrics::render`] and serves the text.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Metric handles for one coordinator.
///
/// Clone-friendly: prometheus handles are `Arc`s inside.
#[derive(Clone)]
pub struct CoordinatorMetrics {
    registry: Registry,
    /// Proposals stored (not counting idempotent re-proposals).
    pub proposals_created_total: IntCounter,
    /// Confirmations appended after proposal creation.
    pub approvals_accepted_total: IntCounter,
    /// Proposals that reached quorum.
    pub quorum_reached_total: IntCounter,
    /// Rejected coordinator requests, by error label.
    pub rejections_total: IntCounterVec,
    /// Proposals moved to `Executed`.
    pub executions_succeeded_total: IntCounter,
    /// Failed executions, by failure kind.
    pub executions_failed_total: IntCounterVec,
    /// Calls made to the execution service, retries included.
    pub execution_attempts_total: IntCounter,
}

impl CoordinatorMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cosign".into()), None)?;

        let proposals_created_total = IntCounter::new(
            "proposals_created_total",
            "Total number of proposals stored in the ledger",
        )?;
        registry.register(Box::new(proposals_created_total.clone()))?;

        let approvals_accepted_total = IntCounter::new(
            "approvals_accepted_total",
            "Total number of approvals appended to existing proposals",
        )?;
        registry.register(Box::new(approvals_accepted_total.clone()))?;

        let quorum_reached_total = IntCounter::new(
            "quorum_reached_total",
            "Total number of proposals that reached their confirmation threshold",
        )?;
        registry.register(Box::new(quorum_reached_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "rejections_total",
                "Total number of rejected coordinator requests",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let executions_succeeded_total = IntCounter::new(
            "executions_succeeded_total",
            "Total number of proposals executed on chain",
        )?;
        registry.register(Box::new(executions_succeeded_total.clone()))?;

        let executions_failed_total = IntCounterVec::new(
            Opts::new(
                "executions_failed_total",
                "Total number of failed executions",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(executions_failed_total.clone()))?;

        let execution_attempts_total = IntCounter::new(
            "execution_attempts_total",
            "Total number of calls to the execution service",
        )?;
        registry.register(Box::new(execution_attempts_total.clone()))?;

        Ok(Self {
            registry,
            proposals_created_total,
            approvals_accepted_total,
            quorum_reached_total,
            rejections_total,
            executions_succeeded_total,
            executions_failed_total,
            execution_attempts_total,
        })
    }

    /// Count a rejection under `reason`.
    pub fn reject(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    /// Encode all registered metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
