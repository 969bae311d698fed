use std::time::Duration;

use tokio::sync::watch;

/// Accumulated usage of successful routed calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
    pub total_latency: Duration,
}

impl MetricsSnapshot {
    /// Zero when no call has completed yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => self.total_latency.div_f64(self.calls as f64),
        }
    }
}

/// Router-owned accumulator; observers subscribe to snapshots.
#[derive(Debug)]
pub struct RouterMetrics {
    tx: watch::Sender<MetricsSnapshot>,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterMetrics {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(MetricsSnapshot::default());
        Self { tx }
    }

    pub fn record(&self, tokens_in: u64, tokens_out: u64, cost: f64, latency: Duration) {
        self.tx.send_modify(|m| {
            m.calls += 1;
            m.tokens_in += tokens_in;
            m.tokens_out += tokens_out;
            m.cost += cost;
            m.total_latency += latency;
        });
    }

    pub fn reset(&self) {
        self.tx.send_replace(MetricsSnapshot::default());
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.tx.subscribe()
    }
}
