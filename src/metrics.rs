//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub nonce_accounts_created: IntCounter,
    pub nonce_accounts_closed: IntCounter,
    pub nonce_poll_attempts: IntCounter,
    pub rpc_retries: IntCounter,
    pub partial_signatures: IntCounter,
    pub transactions_submitted: IntCounter,
    pub transactions_failed: IntCounter,

    // Histograms
    pub nonce_poll_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let nonce_accounts_created = IntCounter::with_opts(Opts::new(
            "nonce_accounts_created",
            "Number of durable nonce accounts created",
        ))?;

        let nonce_accounts_closed = IntCounter::with_opts(Opts::new(
            "nonce_accounts_closed",
            "Number of durable nonce accounts withdrawn and closed",
        ))?;

        let nonce_poll_attempts = IntCounter::with_opts(Opts::new(
            "nonce_poll_attempts",
            "Account reads issued while waiting for a nonce account",
        ))?;

        let rpc_retries = IntCounter::with_opts(Opts::new(
            "rpc_retries",
            "RPC calls retried after a transient failure",
        ))?;

        let partial_signatures = IntCounter::with_opts(Opts::new(
            "partial_signatures",
            "Signatures applied to multisig transactions",
        ))?;

        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "transactions_submitted",
            "Fully signed multisig transactions accepted by the cluster",
        ))?;

        let transactions_failed = IntCounter::with_opts(Opts::new(
            "transactions_failed",
            "Multisig transactions rejected by the cluster",
        ))?;

        let nonce_poll_latency = Histogram::with_opts(
            HistogramOpts::new(
                "nonce_poll_latency_seconds",
                "Time until a new nonce account became visible",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(nonce_accounts_created.clone()))?;
        registry.register(Box::new(nonce_accounts_closed.clone()))?;
        registry.register(Box::new(nonce_poll_attempts.clone()))?;
        registry.register(Box::new(rpc_retries.clone()))?;
        registry.register(Box::new(partial_signatures.clone()))?;
        registry.register(Box::new(transactions_submitted.clone()))?;
        registry.register(Box::new(transactions_failed.clone()))?;
        registry.register(Box::new(nonce_poll_latency.clone()))?;

        Ok(Self {
            registry,
            nonce_accounts_created,
            nonce_accounts_closed,
            nonce_poll_attempts,
            rpc_retries,
            partial_signatures,
            transactions_submitted,
            transactions_failed,
            nonce_poll_latency,
        })
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_registry_renders_all_families() {
        let m = Metrics::new().unwrap();
        m.transactions_submitted.inc();
        m.nonce_poll_latency.observe(0.7);

        let text = m.render().unwrap();
        assert!(text.contains("transactions_submitted 1"));
        assert!(text.contains("nonce_poll_latency_seconds_count 1"));
        assert!(text.contains("nonce_accounts_created 0"));
    }

    #[test]
    fn test_global_metrics_is_shared() {
        let before = metrics().rpc_retries.get();
        metrics().rpc_retries.inc();
        assert!(metrics().rpc_retries.get() > before);
    }
}
