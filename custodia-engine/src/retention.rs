//! Retention Sweeper — storage-limitation enforcement per data category.
//!
//! Each category carries a retention policy; when a subject's data in that
//! category outlives it, the sweeper disposes of the bucket by the policy's
//! method. Age is measured from the subject's creation; later writes do
//! not push the disposal date out.
//!
//! Disposal never happens under a legal hold, and never without explicit
//! confirmation when the policy demands one; both cases raise an alert and
//! leave the data in place.

use crate::audit::{AuditEvent, AuditLog};
use crate::store::SubjectStore;
use crate::types::{FieldValue, RetentionPolicy};
use custodia_core::alert::AlertSink;
use custodia_core::clock::Clock;
use custodia_core::error::{CustodiaError, CustodiaResult};
use custodia_core::scheduler::PeriodicTask;
use custodia_core::types::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SECS_PER_DAY: i64 = 86_400;

/// Outcome counters for one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SweepReport {
    pub buckets_due: usize,
    pub buckets_deleted: usize,
    pub buckets_anonymized: usize,
    pub buckets_archived: usize,
    pub buckets_blocked: usize,
}

pub struct RetentionSweeper {
    policies: HashMap<DataCategory, RetentionPolicy>,
    store: Arc<dyn SubjectStore>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    total_sweeps: AtomicU64,
}

/// Category policy table mirroring the classification registry's retention
/// horizons. Health records are archived, identifiers are anonymized to
/// keep referential integrity, the rest is deleted outright.
pub fn default_policies() -> Vec<RetentionPolicy> {
    let policy = |category, retention_days, archival_days, disposal_method| RetentionPolicy {
        category,
        retention_days,
        archival_days,
        disposal_method,
        legal_hold: false,
        automated_disposal: true,
        confirmation_required: false,
    };
    vec![
        policy(DataCategory::Personal, 1_825, None, DisposalMethod::Anonymization),
        policy(DataCategory::Health, 7_300, Some(7_300), DisposalMethod::Archival),
        policy(DataCategory::Financial, 1_825, None, DisposalMethod::PermanentDeletion),
        policy(DataCategory::Biometric, 1_095, None, DisposalMethod::PermanentDeletion),
        policy(DataCategory::Contact, 1_825, None, DisposalMethod::PermanentDeletion),
    ]
}

impl RetentionSweeper {
    pub fn new(
        policies: Vec<RetentionPolicy>,
        store: Arc<dyn SubjectStore>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            policies: policies.into_iter().map(|p| (p.category, p)).collect(),
            store,
            audit,
            clock,
            alerts,
            total_sweeps: AtomicU64::new(0),
        }
    }

    pub fn policies(&self) -> Vec<RetentionPolicy> {
        self.policies.values().cloned().collect()
    }

    /// Categories currently past their retention horizon, per subject.
    pub fn due(&self) -> Vec<(String, DataCategory)> {
        let now = self.clock.now();
        let mut due = Vec::new();
        for id in self.store.ids() {
            let Ok(subject) = self.store.read(&id) else { continue };
            let age_days = (now - subject.created_at) / SECS_PER_DAY;
            for (category, policy) in &self.policies {
                if age_days >= i64::from(policy.retention_days)
                    && holds_disposable_data(subject.buckets.get(*category))
                {
                    due.push((id.clone(), *category));
                }
            }
        }
        due
    }

    /// One full pass over the store. Safe to re-run: already-disposed
    /// buckets hold nothing disposable and are skipped.
    pub fn sweep(&self) -> SweepReport {
        self.total_sweeps.fetch_add(1, Ordering::Relaxed);
        let mut report = SweepReport::default();
        for (subject_id, category) in self.due() {
            report.buckets_due += 1;
            let policy = &self.policies[&category];
            if policy.legal_hold || policy.confirmation_required || !policy.automated_disposal {
                report.buckets_blocked += 1;
                self.alerts.notify(EngineAlert {
                    timestamp: self.clock.now(),
                    severity: Severity::Medium,
                    component: "retention".into(),
                    title: "Disposal blocked".into(),
                    details: format!(
                        "subject {} category {:?} past retention but {}",
                        subject_id,
                        category,
                        if policy.legal_hold { "under legal hold" } else { "awaiting confirmation" }
                    ),
                });
                continue;
            }
            match self.dispose(&subject_id, category, policy) {
                Ok(Disposed::Deleted) => report.buckets_deleted += 1,
                Ok(Disposed::Anonymized) => report.buckets_anonymized += 1,
                Ok(Disposed::Archived) => report.buckets_archived += 1,
                Ok(Disposed::Nothing) => {}
                Err(e) => {
                    warn!(subject = %subject_id, category = ?category, error = %e, "Disposal failed");
                }
            }
        }
        info!(
            deleted = report.buckets_deleted,
            anonymized = report.buckets_anonymized,
            archived = report.buckets_archived,
            blocked = report.buckets_blocked,
            "Retention sweep complete"
        );
        report
    }

    /// Manual disposal, e.g. operator-confirmed after a "Disposal blocked"
    /// alert. A legal hold still refuses; `confirmed` overrides only the
    /// confirmation requirement.
    pub fn dispose_category(
        &self,
        subject_id: &str,
        category: DataCategory,
        confirmed: bool,
    ) -> CustodiaResult<()> {
        let policy = self
            .policies
            .get(&category)
            .ok_or_else(|| CustodiaError::NotFound(format!("policy for {:?}", category)))?;
        if policy.legal_hold {
            return Err(CustodiaError::RetentionBlocked(format!(
                "category {:?} is under legal hold",
                category
            )));
        }
        if policy.confirmation_required && !confirmed {
            return Err(CustodiaError::RetentionBlocked(format!(
                "category {:?} requires confirmed disposal",
                category
            )));
        }
        self.dispose(subject_id, category, policy).map(|_| ())
    }

    fn dispose(
        &self,
        subject_id: &str,
        category: DataCategory,
        policy: &RetentionPolicy,
    ) -> CustodiaResult<Disposed> {
        let now = self.clock.now();
        let mut outcome = Disposed::Nothing;
        self.store.update(subject_id, &mut |subject| {
            let bucket = subject.buckets.get_mut(category);
            if !holds_disposable_data(bucket) {
                return;
            }
            match policy.disposal_method {
                DisposalMethod::PermanentDeletion => {
                    bucket.clear();
                    outcome = Disposed::Deleted;
                }
                DisposalMethod::Anonymization => {
                    for (name, value) in bucket.iter_mut() {
                        if !matches!(value, FieldValue::Anonymized { .. }) {
                            *value = FieldValue::Anonymized {
                                pseudonym: pseudonym(&subject.id, name),
                                anonymized_at: now,
                            };
                        }
                    }
                    outcome = Disposed::Anonymized;
                }
                DisposalMethod::Archival => {
                    // Handing the bucket to cold storage is the commitment
                    // point; the live record is cleared once the intent is
                    // on record.
                    bucket.clear();
                    outcome = Disposed::Archived;
                }
            }
        })?;

        if outcome == Disposed::Nothing {
            return Ok(outcome);
        }
        if outcome == Disposed::Archived {
            self.alerts.notify(EngineAlert {
                timestamp: now,
                severity: Severity::Low,
                component: "retention".into(),
                title: "Archival handoff".into(),
                details: format!("subject {} category {:?} moved to archive", subject_id, category),
            });
        }
        self.audit.record(AuditEvent {
            actor_id: "system".into(),
            actor_role: Role::System,
            action: Action::Delete,
            resource_type: "data_subject".into(),
            resource_id: subject_id.into(),
            subject_id: subject_id.into(),
            data_type: format!("{:?}", category).to_lowercase(),
            purpose: Purpose::Audit,
            legal_basis: Some(LegalBasis::LegalObligation),
            consent_verified: false,
            encryption_applied: false,
            masking_applied: false,
            // Scheduled housekeeping, not an access.
            risk_level: Severity::Low,
        });
        info!(subject = %subject_id, category = ?category, method = ?policy.disposal_method, "Retention disposal applied");
        Ok(outcome)
    }

    /// Run `sweep` on a fixed interval until the returned handle is
    /// stopped or dropped.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> PeriodicTask {
        let sweeper = Arc::clone(self);
        PeriodicTask::spawn("retention-sweep", interval, move || {
            sweeper.sweep();
        })
    }

    pub fn total_sweeps(&self) -> u64 {
        self.total_sweeps.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposed {
    Deleted,
    Anonymized,
    Archived,
    Nothing,
}

/// A bucket with only anonymized values left has already been disposed.
fn holds_disposable_data(bucket: &crate::types::Bucket) -> bool {
    bucket
        .values()
        .any(|v| !matches!(v, FieldValue::Anonymized { .. }))
}

/// Stable pseudonym: same subject and field always map to the same token,
/// so anonymized records stay joinable without being identifying.
fn pseudonym(subject_id: &str, field_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject_id.as_bytes());
    hasher.update(b":");
    hasher.update(field_name.as_bytes());
    let digest = hasher.finalize();
    format!(
        "anon_{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySubjectStore;
    use crate::types::{DataRights, DataSubject, SubjectBuckets};
    use custodia_core::alert::MemoryAlertSink;
    use custodia_core::clock::ManualClock;
    use custodia_core::config::AuditConfig;

    // Noon UTC keeps disposal audit entries inside business hours.
    const START: i64 = 12 * 3_600;

    struct Fixture {
        clock: Arc<ManualClock>,
        alerts: Arc<MemoryAlertSink>,
        store: Arc<InMemorySubjectStore>,
        audit: Arc<AuditLog>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let alerts = Arc::new(MemoryAlertSink::new());
        let store = Arc::new(InMemorySubjectStore::new());
        let audit = Arc::new(AuditLog::new(AuditConfig::default(), clock.clone(), alerts.clone()));
        Fixture { clock, alerts, store, audit }
    }

    fn sweeper(f: &Fixture, policies: Vec<RetentionPolicy>) -> RetentionSweeper {
        RetentionSweeper::new(
            policies,
            f.store.clone(),
            f.audit.clone(),
            f.clock.clone(),
            f.alerts.clone(),
        )
    }

    fn seed_subject(f: &Fixture, id: &str) {
        let mut buckets = SubjectBuckets::default();
        buckets.personal.insert("name".into(), FieldValue::Plain("Joana Silva".into()));
        buckets.personal.insert("cpf".into(), FieldValue::Plain("123.456.789-00".into()));
        buckets.financial.insert("income".into(), FieldValue::Number(80_000.0));
        buckets.health.insert("allergies".into(), FieldValue::Plain("penicillin".into()));
        f.store
            .insert(DataSubject {
                id: id.into(),
                subject_type: SubjectType::Client,
                buckets,
                rights: DataRights::default(),
                created_at: START,
                updated_at: START,
            })
            .unwrap();
    }

    fn advance_days(f: &Fixture, days: i64) {
        f.clock.advance(days * SECS_PER_DAY);
    }

    #[test]
    fn test_nothing_due_before_horizon() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());
        advance_days(&f, 1_000);
        assert!(sweeper.due().is_empty());
        assert_eq!(sweeper.sweep(), SweepReport::default());
    }

    #[test]
    fn test_anonymization_replaces_fields_with_stable_pseudonyms() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());
        advance_days(&f, 1_826);

        let report = sweeper.sweep();
        assert_eq!(report.buckets_anonymized, 1);

        let subject = f.store.read("s1").unwrap();
        let name = subject.buckets.personal.get("name").unwrap();
        assert!(matches!(name, FieldValue::Anonymized { .. }));
        if let FieldValue::Anonymized { pseudonym: p, .. } = name {
            assert_eq!(*p, pseudonym("s1", "name"));
        }
    }

    #[test]
    fn test_permanent_deletion_clears_bucket() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());
        advance_days(&f, 1_826);

        let report = sweeper.sweep();
        // Only the financial bucket holds data past a deletion policy;
        // empty biometric/contact buckets are never "due".
        assert_eq!(report.buckets_deleted, 1);
        let subject = f.store.read("s1").unwrap();
        assert!(subject.buckets.financial.is_empty());
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());
        advance_days(&f, 1_826);

        let first = sweeper.sweep();
        assert!(first.buckets_anonymized + first.buckets_deleted > 0);
        let second = sweeper.sweep();
        assert_eq!(second, SweepReport::default());
    }

    #[test]
    fn test_archival_emits_handoff_and_clears() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());
        advance_days(&f, 7_300);

        sweeper.sweep();
        let subject = f.store.read("s1").unwrap();
        assert!(subject.buckets.health.is_empty());
        assert!(f.alerts.alerts().iter().any(|a| a.title == "Archival handoff"));
    }

    #[test]
    fn test_legal_hold_blocks_even_confirmed_disposal() {
        let f = fixture();
        seed_subject(&f, "s1");
        let mut policies = default_policies();
        for p in &mut policies {
            if p.category == DataCategory::Financial {
                p.legal_hold = true;
            }
        }
        let sweeper = sweeper(&f, policies);
        advance_days(&f, 1_826);

        let report = sweeper.sweep();
        assert!(report.buckets_blocked >= 1);
        assert!(f.alerts.alerts().iter().any(|a| a.title == "Disposal blocked"));
        assert!(!f.store.read("s1").unwrap().buckets.financial.is_empty());

        let err = sweeper.dispose_category("s1", DataCategory::Financial, true).unwrap_err();
        assert!(matches!(err, CustodiaError::RetentionBlocked(_)));
    }

    #[test]
    fn test_confirmation_required_blocks_sweep_but_allows_manual() {
        let f = fixture();
        seed_subject(&f, "s1");
        let mut policies = default_policies();
        for p in &mut policies {
            if p.category == DataCategory::Financial {
                p.confirmation_required = true;
            }
        }
        let sweeper = sweeper(&f, policies);
        advance_days(&f, 1_826);

        sweeper.sweep();
        assert!(!f.store.read("s1").unwrap().buckets.financial.is_empty());

        let err = sweeper.dispose_category("s1", DataCategory::Financial, false).unwrap_err();
        assert!(matches!(err, CustodiaError::RetentionBlocked(_)));

        sweeper.dispose_category("s1", DataCategory::Financial, true).unwrap();
        assert!(f.store.read("s1").unwrap().buckets.financial.is_empty());
    }

    #[test]
    fn test_late_write_does_not_reset_the_disposal_clock() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());

        // A write just before the horizon must not defer disposal: age is
        // anchored to creation, not last activity.
        advance_days(&f, 1_824);
        let touch = f.clock.now();
        f.store
            .update("s1", &mut |s| {
                s.buckets.contact.insert("email".into(), FieldValue::Plain("j@x.com".into()));
                s.updated_at = touch;
            })
            .unwrap();

        advance_days(&f, 2);
        let report = sweeper.sweep();
        assert!(report.buckets_deleted >= 1);
        assert!(f.store.read("s1").unwrap().buckets.financial.is_empty());
    }

    #[test]
    fn test_eligible_at_exact_horizon_not_a_day_early() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());

        advance_days(&f, 1_824);
        assert!(sweeper.due().is_empty());

        advance_days(&f, 1);
        assert!(sweeper
            .due()
            .iter()
            .any(|(id, c)| id == "s1" && *c == DataCategory::Financial));
    }

    #[test]
    fn test_disposal_is_audited_as_low_risk() {
        let f = fixture();
        seed_subject(&f, "s1");
        let sweeper = sweeper(&f, default_policies());
        advance_days(&f, 1_826);
        sweeper.sweep();

        let entries = f.audit.entries();
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|e| {
            e.actor_id == "system" && e.action == Action::Delete && e.risk_level == Severity::Low
        }));
    }
}
