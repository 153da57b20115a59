//! Alert Sink — advisory notices to an external alerting collaborator.

use crate::types::EngineAlert;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_ALERTS: usize = 5_000;

/// Anomaly and breach notices are pushed here. Sinks must never block the
/// originating operation; implementations should queue and return.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: EngineAlert);
}

/// Bounded in-process sink. The default for tests and embedded use; a real
/// deployment forwards to its paging/notification integration instead.
pub struct MemoryAlertSink {
    alerts: RwLock<Vec<EngineAlert>>,
    total_notified: AtomicU64,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
            total_notified: AtomicU64::new(0),
        }
    }

    pub fn alerts(&self) -> Vec<EngineAlert> {
        self.alerts.read().clone()
    }

    pub fn total_notified(&self) -> u64 {
        self.total_notified.load(Ordering::Relaxed)
    }
}

impl Default for MemoryAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink for MemoryAlertSink {
    fn notify(&self, alert: EngineAlert) {
        self.total_notified.fetch_add(1, Ordering::Relaxed);
        let mut alerts = self.alerts.write();
        if alerts.len() >= MAX_ALERTS {
            alerts.remove(0);
        }
        alerts.push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn alert(title: &str) -> EngineAlert {
        EngineAlert {
            timestamp: 100,
            severity: Severity::Medium,
            component: "test".into(),
            title: title.into(),
            details: String::new(),
        }
    }

    #[test]
    fn test_sink_records_notices() {
        let sink = MemoryAlertSink::new();
        sink.notify(alert("first"));
        sink.notify(alert("second"));
        assert_eq!(sink.total_notified(), 2);
        assert_eq!(sink.alerts()[0].title, "first");
    }

    #[test]
    fn test_sink_is_bounded() {
        let sink = MemoryAlertSink::new();
        for i in 0..MAX_ALERTS + 10 {
            sink.notify(alert(&format!("a{}", i)));
        }
        assert_eq!(sink.alerts().len(), MAX_ALERTS);
        assert_eq!(sink.total_notified(), (MAX_ALERTS + 10) as u64);
    }
}
