//! Audit Log — append-only record of every decision, bounded in memory,
//! with inline anomaly detection.
//!
//! Entries are immutable once written. When the log exceeds its cap the
//! oldest half is trimmed in one batch, so steady-state load does not trim
//! on every insert.

use crate::types::AuditLogEntry;
use custodia_core::alert::AlertSink;
use custodia_core::clock::Clock;
use custodia_core::config::AuditConfig;
use custodia_core::types::{Action, EngineAlert, LegalBasis, Purpose, Role, Severity};
use chrono::Timelike;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// One recordable event; the log assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: String,
    pub actor_role: Role,
    pub action: Action,
    pub resource_type: String,
    pub resource_id: String,
    pub subject_id: String,
    pub data_type: String,
    pub purpose: Purpose,
    pub legal_basis: Option<LegalBasis>,
    pub consent_verified: bool,
    pub encryption_applied: bool,
    pub masking_applied: bool,
    pub risk_level: Severity,
}

/// Query filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub action: Option<Action>,
    pub min_risk: Option<Severity>,
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.actor_id.as_deref().map_or(true, |a| entry.actor_id == a)
            && self.subject_id.as_deref().map_or(true, |s| entry.subject_id == s)
            && self.action.map_or(true, |a| entry.action == a)
            && self.min_risk.map_or(true, |r| entry.risk_level >= r)
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp <= t)
    }
}

pub struct AuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
    config: AuditConfig,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    next_id: AtomicU64,
    total_recorded: AtomicU64,
    total_trimmed: AtomicU64,
}

impl AuditLog {
    pub fn new(config: AuditConfig, clock: Arc<dyn Clock>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            config,
            clock,
            alerts,
            next_id: AtomicU64::new(1),
            total_recorded: AtomicU64::new(0),
            total_trimmed: AtomicU64::new(0),
        }
    }

    /// Append an entry, run anomaly checks against the retained window,
    /// and trim if the log is over its cap. Returns the entry id.
    pub fn record(&self, event: AuditEvent) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timestamp = self.clock.now();
        let entry = AuditLogEntry {
            id,
            timestamp,
            actor_id: event.actor_id,
            actor_role: event.actor_role,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            subject_id: event.subject_id,
            data_type: event.data_type,
            purpose: event.purpose,
            legal_basis: event.legal_basis,
            consent_verified: event.consent_verified,
            encryption_applied: event.encryption_applied,
            masking_applied: event.masking_applied,
            risk_level: event.risk_level,
        };
        self.total_recorded.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write();
        self.check_excessive_access(&entries, &entry);
        self.check_after_hours(&entry);
        entries.push(entry);

        if entries.len() > self.config.max_entries {
            let drained = entries.len() / 2;
            entries.drain(..drained);
            self.total_trimmed.fetch_add(drained as u64, Ordering::Relaxed);
            warn!(trimmed = drained, retained = entries.len(), "Audit log trimmed oldest half");
        }
        id
    }

    /// Fires when one actor's entry count inside the sliding window,
    /// counting the entry being recorded, exceeds the threshold.
    fn check_excessive_access(&self, entries: &[AuditLogEntry], entry: &AuditLogEntry) {
        let window_start = entry.timestamp - self.config.excessive_window_secs;
        let recent = entries
            .iter()
            .rev()
            .take_while(|e| e.timestamp > window_start)
            .filter(|e| e.actor_id == entry.actor_id)
            .count()
            + 1;
        if recent > self.config.excessive_access_threshold {
            self.alerts.notify(EngineAlert {
                timestamp: entry.timestamp,
                severity: Severity::High,
                component: "audit".into(),
                title: "Excessive access rate".into(),
                details: format!(
                    "actor {} made {} accesses within {}s",
                    entry.actor_id, recent, self.config.excessive_window_secs
                ),
            });
        }
    }

    /// High and Critical risk activity outside business hours is flagged.
    fn check_after_hours(&self, entry: &AuditLogEntry) {
        if entry.risk_level < Severity::High {
            return;
        }
        let Some(when) = chrono::DateTime::from_timestamp(entry.timestamp, 0) else {
            return;
        };
        let hour = when.hour();
        if hour < u32::from(self.config.business_hours_start)
            || hour >= u32::from(self.config.business_hours_end)
        {
            self.alerts.notify(EngineAlert {
                timestamp: entry.timestamp,
                severity: Severity::Medium,
                component: "audit".into(),
                title: "After-hours sensitive access".into(),
                details: format!(
                    "actor {} accessed {} data at hour {:02}",
                    entry.actor_id, entry.data_type, hour
                ),
            });
        }
    }

    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Full snapshot of retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded.load(Ordering::Relaxed)
    }

    pub fn total_trimmed(&self) -> u64 {
        self.total_trimmed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::alert::MemoryAlertSink;
    use custodia_core::clock::ManualClock;

    fn event(actor: &str, risk: Severity) -> AuditEvent {
        AuditEvent {
            actor_id: actor.into(),
            actor_role: Role::Professional,
            action: Action::Read,
            resource_type: "data_subject".into(),
            resource_id: "s1".into(),
            subject_id: "s1".into(),
            data_type: "health".into(),
            purpose: Purpose::Treatment,
            legal_basis: Some(LegalBasis::Consent),
            consent_verified: true,
            encryption_applied: true,
            masking_applied: false,
            risk_level: risk,
        }
    }

    fn log_at(start: i64, config: AuditConfig) -> (Arc<ManualClock>, Arc<MemoryAlertSink>, AuditLog) {
        let clock = Arc::new(ManualClock::new(start));
        let alerts = Arc::new(MemoryAlertSink::new());
        let log = AuditLog::new(config, clock.clone(), alerts.clone());
        (clock, alerts, log)
    }

    // Business hours: 10:00 UTC on day one.
    const BUSINESS_HOURS_TS: i64 = 10 * 3_600;

    #[test]
    fn test_record_assigns_monotonic_ids_and_timestamps() {
        let (clock, _, log) = log_at(BUSINESS_HOURS_TS, AuditConfig::default());
        let first = log.record(event("dr1", Severity::Low));
        clock.advance(60);
        let second = log.record(event("dr1", Severity::Low));
        assert!(second > first);
        let entries = log.entries();
        assert_eq!(entries[1].timestamp - entries[0].timestamp, 60);
    }

    #[test]
    fn test_query_filters_compose() {
        let (clock, _, log) = log_at(BUSINESS_HOURS_TS, AuditConfig::default());
        log.record(event("dr1", Severity::Low));
        clock.advance(100);
        log.record(event("dr2", Severity::High));
        clock.advance(100);
        log.record(event("dr1", Severity::Critical));

        let by_actor = log.query(&AuditFilter { actor_id: Some("dr1".into()), ..Default::default() });
        assert_eq!(by_actor.len(), 2);

        let risky = log.query(&AuditFilter { min_risk: Some(Severity::High), ..Default::default() });
        assert_eq!(risky.len(), 2);

        let late = log.query(&AuditFilter {
            since: Some(BUSINESS_HOURS_TS + 150),
            ..Default::default()
        });
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].actor_id, "dr1");
    }

    #[test]
    fn test_over_cap_trims_oldest_half() {
        let config = AuditConfig { max_entries: 10, ..Default::default() };
        let (_, _, log) = log_at(BUSINESS_HOURS_TS, config);
        for _ in 0..11 {
            log.record(event("dr1", Severity::Low));
        }
        // 11 entries tripped the cap; the oldest 5 were dropped.
        assert_eq!(log.len(), 6);
        assert_eq!(log.total_trimmed(), 5);
        assert_eq!(log.total_recorded(), 11);
        assert_eq!(log.entries().first().map(|e| e.id), Some(6));
    }

    #[test]
    fn test_excessive_access_fires_past_threshold() {
        let config = AuditConfig { excessive_access_threshold: 5, ..Default::default() };
        let (_, alerts, log) = log_at(BUSINESS_HOURS_TS, config);
        for _ in 0..5 {
            log.record(event("dr1", Severity::Low));
        }
        assert!(alerts.alerts().is_empty());
        // Sixth access within the window crosses the threshold.
        log.record(event("dr1", Severity::Low));
        let fired = alerts.alerts();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].title, "Excessive access rate");
    }

    #[test]
    fn test_excessive_access_window_slides() {
        let config = AuditConfig {
            excessive_access_threshold: 5,
            excessive_window_secs: 3_600,
            ..Default::default()
        };
        let (clock, alerts, log) = log_at(BUSINESS_HOURS_TS, config);
        for _ in 0..5 {
            log.record(event("dr1", Severity::Low));
        }
        // Past the window the count restarts; no alert.
        clock.advance(3_601);
        log.record(event("dr1", Severity::Low));
        assert!(alerts.alerts().is_empty());
    }

    #[test]
    fn test_other_actors_do_not_count_toward_threshold() {
        let config = AuditConfig { excessive_access_threshold: 5, ..Default::default() };
        let (_, alerts, log) = log_at(BUSINESS_HOURS_TS, config);
        for i in 0..6 {
            log.record(event(&format!("dr{}", i), Severity::Low));
        }
        assert!(alerts.alerts().is_empty());
    }

    #[test]
    fn test_after_hours_critical_access_alerts() {
        // 03:00 UTC.
        let (_, alerts, log) = log_at(3 * 3_600, AuditConfig::default());
        log.record(event("dr1", Severity::Critical));
        let fired = alerts.alerts();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].title, "After-hours sensitive access");
    }

    #[test]
    fn test_after_hours_low_risk_is_quiet() {
        let (_, alerts, log) = log_at(3 * 3_600, AuditConfig::default());
        log.record(event("dr1", Severity::Low));
        assert!(alerts.alerts().is_empty());
    }

    #[test]
    fn test_business_hours_critical_is_quiet() {
        let (_, alerts, log) = log_at(BUSINESS_HOURS_TS, AuditConfig::default());
        log.record(event("dr1", Severity::Critical));
        assert!(alerts.alerts().is_empty());
    }
}
