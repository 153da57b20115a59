//! Data Protection Service — the facade wiring classification, sealing,
//! consent, decisions, masking, audit and retention into one entry point.
//!
//! Every subject operation runs the same pipeline: decide, transform,
//! persist, audit. Denials come back as `AccessDenied` errors carrying the
//! decision's reason; the full decision value is attached to granted reads.

use crate::access::AccessDecisionEngine;
use crate::audit::{AuditEvent, AuditLog};
use crate::consent::ConsentLedger;
use crate::envelope::EnvelopeCodec;
use crate::masking::DataMasker;
use crate::registry::FieldRegistry;
use crate::retention::{default_policies, RetentionSweeper};
use crate::store::{InMemorySubjectStore, SubjectStore};
use crate::types::*;
use custodia_core::alert::{AlertSink, MemoryAlertSink};
use custodia_core::clock::{Clock, SystemClock};
use custodia_core::config::EngineConfig;
use custodia_core::error::{CustodiaError, CustodiaResult};
use custodia_core::keys::{KeyProvider, StaticKeyProvider};
use custodia_core::scheduler::PeriodicTask;
use custodia_core::types::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct DataProtectionService {
    config: EngineConfig,
    registry: Arc<FieldRegistry>,
    codec: EnvelopeCodec,
    consents: Arc<ConsentLedger>,
    decisions: AccessDecisionEngine,
    masker: DataMasker,
    audit: Arc<AuditLog>,
    sweeper: Arc<RetentionSweeper>,
    store: Arc<dyn SubjectStore>,
    clock: Arc<dyn Clock>,
    sweep_task: Mutex<Option<PeriodicTask>>,
}

impl DataProtectionService {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SubjectStore>,
        keys: Arc<dyn KeyProvider>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let registry = Arc::new(FieldRegistry::with_defaults());
        let consents = Arc::new(ConsentLedger::new(clock.clone()));
        let audit = Arc::new(AuditLog::new(config.audit.clone(), clock.clone(), alerts.clone()));
        let sweeper = Arc::new(RetentionSweeper::new(
            default_policies(),
            store.clone(),
            audit.clone(),
            clock.clone(),
            alerts.clone(),
        ));
        Self {
            codec: EnvelopeCodec::new(registry.clone(), keys, clock.clone()),
            decisions: AccessDecisionEngine::new(config.decision.clone(), consents.clone()),
            masker: DataMasker::new(registry.clone()),
            config,
            registry,
            consents,
            audit,
            sweeper,
            store,
            clock,
            sweep_task: Mutex::new(None),
        }
    }

    /// In-memory engine with freshly generated tier keys. Suitable for
    /// embedded use and tests; production wires its own store and keys.
    pub fn with_defaults() -> Self {
        Self::new(
            EngineConfig::default(),
            Arc::new(InMemorySubjectStore::new()),
            Arc::new(StaticKeyProvider::random()),
            Arc::new(SystemClock),
            Arc::new(MemoryAlertSink::new()),
        )
    }

    // ── Subject lifecycle ───────────────────────────────────────────────────

    /// Register a new subject. Encryption-required fields are sealed before
    /// anything is persisted; if any field fails to seal, nothing is stored.
    pub fn create_subject(
        &self,
        actor: &Actor,
        id: &str,
        subject_type: SubjectType,
        mut buckets: SubjectBuckets,
    ) -> CustodiaResult<()> {
        let now = self.clock.now();
        let decision = self.decisions.decide(actor, Action::Create, id, true, now)?;
        if !decision.granted {
            self.record_denied(actor, Action::Create, id, &decision);
            return Err(denial_error(&decision));
        }

        let mut sealed_any = false;
        for category in DataCategory::ALL {
            let bucket = buckets.get_mut(category);
            let before = bucket.len();
            let failures = self.codec.seal_bucket(bucket);
            if let Some((field, error)) = failures.into_iter().next() {
                info!(subject = %id, field = %field, "Subject creation aborted on sealing failure");
                return Err(error);
            }
            sealed_any |= before > 0 && bucket.values().any(|v| matches!(v, FieldValue::Sealed(_)));
        }

        let risk = self.bucket_risk(&buckets);
        self.store.insert(DataSubject {
            id: id.into(),
            subject_type,
            buckets,
            rights: DataRights::default(),
            created_at: now,
            updated_at: now,
        })?;

        self.record_granted(actor, Action::Create, id, "data_subject", &decision, sealed_any, false, risk);
        info!(subject = %id, subject_type = ?subject_type, "Data subject registered");
        Ok(())
    }

    /// Read a subject as the actor is entitled to see it: sealed fields
    /// opened, then redacted per the actor's role. Fields that fail their
    /// integrity check come back as `Unreadable` without failing the read.
    pub fn read_subject(&self, actor: &Actor, id: &str) -> CustodiaResult<SubjectView> {
        let now = self.clock.now();
        let decision = self.decisions.decide(actor, Action::Read, id, self.store.exists(id), now)?;
        if !decision.granted {
            self.record_denied(actor, Action::Read, id, &decision);
            return Err(denial_error(&decision));
        }

        let subject = self.store.read(id)?;
        let mut buckets = subject.buckets;
        let had_sealed = buckets
            .iter()
            .any(|(_, b)| b.values().any(|v| matches!(v, FieldValue::Sealed(_))));
        for category in DataCategory::ALL {
            self.codec.open_bucket(buckets.get_mut(category));
        }
        let masked = self.masker.redact_view(actor.role, &mut buckets);

        let risk = self.bucket_risk(&buckets);
        self.record_granted(actor, Action::Read, id, "data_subject", &decision, had_sealed, masked > 0, risk);
        Ok(SubjectView {
            id: subject.id,
            subject_type: subject.subject_type,
            buckets,
            consents: self.consents.consents_for(id),
            decision,
        })
    }

    /// Write one field, sealing it first when its classification requires.
    pub fn update_field(
        &self,
        actor: &Actor,
        id: &str,
        category: DataCategory,
        field_name: &str,
        value: FieldValue,
    ) -> CustodiaResult<()> {
        let now = self.clock.now();
        let decision = self.decisions.decide(actor, Action::Update, id, self.store.exists(id), now)?;
        if !decision.granted {
            self.record_denied(actor, Action::Update, id, &decision);
            return Err(denial_error(&decision));
        }

        let spec = self.registry.classify(field_name);
        let needs_seal = spec.map_or(false, |s| s.encryption_required)
            && matches!(value, FieldValue::Plain(_) | FieldValue::Number(_) | FieldValue::Flag(_));
        let stored = if needs_seal {
            FieldValue::Sealed(self.codec.seal(field_name, &value)?)
        } else {
            value
        };
        let risk = spec.map_or(Severity::Low, |s| s.sensitivity.as_risk());

        self.store.update(id, &mut |subject| {
            subject.buckets.get_mut(category).insert(field_name.to_string(), stored.clone());
            subject.updated_at = now;
        })?;

        self.record_granted(
            actor,
            Action::Update,
            id,
            &format!("{:?}", category).to_lowercase(),
            &decision,
            needs_seal,
            false,
            risk,
        );
        Ok(())
    }

    /// Merge a partial set of buckets into an existing subject. Sealing
    /// happens before the merge; if any field fails to seal, the record
    /// is left untouched.
    pub fn update_subject(
        &self,
        actor: &Actor,
        id: &str,
        mut partial: SubjectBuckets,
    ) -> CustodiaResult<()> {
        let now = self.clock.now();
        let decision = self.decisions.decide(actor, Action::Update, id, self.store.exists(id), now)?;
        if !decision.granted {
            self.record_denied(actor, Action::Update, id, &decision);
            return Err(denial_error(&decision));
        }

        let mut sealed_any = false;
        for category in DataCategory::ALL {
            let bucket = partial.get_mut(category);
            let failures = self.codec.seal_bucket(bucket);
            if let Some((_, error)) = failures.into_iter().next() {
                return Err(error);
            }
            sealed_any |= bucket.values().any(|v| matches!(v, FieldValue::Sealed(_)));
        }

        let risk = self.bucket_risk(&partial);
        self.store.update(id, &mut |subject| {
            for category in DataCategory::ALL {
                for (name, value) in partial.get(category) {
                    subject
                        .buckets
                        .get_mut(category)
                        .insert(name.clone(), value.clone());
                }
            }
            subject.updated_at = now;
        })?;

        self.record_granted(actor, Action::Update, id, "data_subject", &decision, sealed_any, false, risk);
        Ok(())
    }

    /// Erasure request. Refused when the subject's erasure right is
    /// disabled, a retained category sits under legal hold, or any
    /// retained category is still inside its mandatory retention window;
    /// otherwise the record and its consent history are removed.
    pub fn delete_subject(&self, actor: &Actor, id: &str) -> CustodiaResult<()> {
        let now = self.clock.now();
        let decision = self.decisions.decide(actor, Action::Delete, id, self.store.exists(id), now)?;
        if !decision.granted {
            self.record_denied(actor, Action::Delete, id, &decision);
            return Err(denial_error(&decision));
        }

        let subject = self.store.read(id)?;
        if !subject.rights.erasure {
            return Err(CustodiaError::ComplianceViolation {
                reason: format!("subject {} has the erasure right disabled", id),
            });
        }
        let age_days = (now - subject.created_at) / 86_400;
        for policy in self.sweeper.policies() {
            if subject.buckets.get(policy.category).is_empty() {
                continue;
            }
            if policy.legal_hold {
                return Err(CustodiaError::RetentionBlocked(format!(
                    "category {:?} is under legal hold",
                    policy.category
                )));
            }
            if age_days < i64::from(policy.retention_days) {
                return Err(CustodiaError::RetentionBlocked(format!(
                    "category {:?} must be retained for {} days",
                    policy.category, policy.retention_days
                )));
            }
        }

        self.store.remove(id)?;
        self.consents.forget(id);
        self.record_granted(actor, Action::Delete, id, "data_subject", &decision, false, false, Severity::High);
        info!(subject = %id, "Data subject erased");
        Ok(())
    }

    /// Portability export: the subject as the actor may see it, as JSON.
    pub fn export_subject(&self, actor: &Actor, id: &str) -> CustodiaResult<String> {
        let now = self.clock.now();
        let decision = self.decisions.decide(actor, Action::Export, id, self.store.exists(id), now)?;
        if !decision.granted {
            self.record_denied(actor, Action::Export, id, &decision);
            return Err(denial_error(&decision));
        }

        let subject = self.store.read(id)?;
        if !subject.rights.portability {
            return Err(CustodiaError::ComplianceViolation {
                reason: format!("subject {} has the portability right disabled", id),
            });
        }
        let mut buckets = subject.buckets;
        for category in DataCategory::ALL {
            self.codec.open_bucket(buckets.get_mut(category));
        }
        let masked = self.masker.redact_view(actor.role, &mut buckets);

        let view = SubjectView {
            id: subject.id,
            subject_type: subject.subject_type,
            buckets,
            consents: self.consents.consents_for(id),
            decision: decision.clone(),
        };
        let json = serde_json::to_string_pretty(&view)
            .map_err(|e| CustodiaError::Config(format!("serialize export: {}", e)))?;
        self.record_granted(actor, Action::Export, id, "data_subject", &decision, true, masked > 0, Severity::High);
        Ok(json)
    }

    /// Apply the compliance transform a processing operation demands to a
    /// loose bucket of field values, without touching stored subjects.
    ///
    /// Collect validates purpose limitation and passes data through; store
    /// seals what must be sealed; share strips everything that cannot
    /// leave the engine and masks the rest; export seals and masks for an
    /// outbound file.
    pub fn process_personal_data(
        &self,
        actor: &Actor,
        operation: ProcessingOperation,
        subject_id: &str,
        mut bucket: Bucket,
    ) -> CustodiaResult<Bucket> {
        let now = self.clock.now();
        let action = match operation {
            ProcessingOperation::Collect => Action::Create,
            ProcessingOperation::Store => Action::Update,
            ProcessingOperation::Share => Action::Share,
            ProcessingOperation::Export => Action::Export,
        };
        let decision = self.decisions.decide(actor, action, subject_id, true, now)?;
        if !decision.granted {
            self.record_denied(actor, action, subject_id, &decision);
            return Err(denial_error(&decision));
        }

        for name in bucket.keys() {
            let Some(spec) = self.registry.classify(name) else { continue };
            if !spec.allowed_purposes.contains(&actor.purpose) {
                return Err(CustodiaError::ComplianceViolation {
                    reason: format!(
                        "field '{}' may not be processed for purpose {:?}",
                        name, actor.purpose
                    ),
                });
            }
        }

        let mut encryption_applied = false;
        let mut masking_applied = false;
        match operation {
            ProcessingOperation::Collect => {}
            ProcessingOperation::Store | ProcessingOperation::Export => {
                if let Some((_, error)) = self.codec.seal_bucket(&mut bucket).into_iter().next() {
                    return Err(error);
                }
                encryption_applied = bucket.values().any(|v| matches!(v, FieldValue::Sealed(_)));
                if operation == ProcessingOperation::Export {
                    masking_applied = self.mask_required(&mut bucket) > 0;
                }
            }
            ProcessingOperation::Share => {
                // Encryption-required fields never leave the engine in any
                // form; the rest of the classified set goes out masked.
                bucket.retain(|name, _| {
                    self.registry.classify(name).map_or(true, |s| !s.encryption_required)
                });
                masking_applied = self.mask_required(&mut bucket) > 0;
            }
        }

        let mut risk = Severity::Low;
        for name in bucket.keys() {
            if let Some(spec) = self.registry.classify(name) {
                risk = risk.max(spec.sensitivity.as_risk());
            }
        }
        self.record_granted(actor, action, subject_id, "processing", &decision, encryption_applied, masking_applied, risk);
        Ok(bucket)
    }

    /// Filtered slice of the audit trail.
    pub fn access_logs(&self, filter: &crate::audit::AuditFilter) -> Vec<AuditLogEntry> {
        self.audit.query(filter)
    }

    // ── Consent ─────────────────────────────────────────────────────────────

    /// Consent may be recorded before the subject record exists: intake
    /// paperwork is signed first, so this is the first step of onboarding.
    pub fn grant_consent(
        &self,
        subject_id: &str,
        consent_type: &str,
        purpose: Purpose,
        expires_at: Option<i64>,
        version: &str,
    ) -> CustodiaResult<String> {
        Ok(self.consents.grant(subject_id, consent_type, purpose, expires_at, version))
    }

    pub fn withdraw_consent(&self, subject_id: &str, consent_id: &str) -> CustodiaResult<()> {
        if self.consents.withdraw(subject_id, consent_id) {
            Ok(())
        } else {
            Err(CustodiaError::NotFound(format!(
                "consent {} for subject {}",
                consent_id, subject_id
            )))
        }
    }

    // ── Retention ───────────────────────────────────────────────────────────

    /// Begin periodic retention sweeps at the configured interval.
    pub fn start_retention_sweeps(&self) {
        let interval = Duration::from_secs(self.config.retention.sweep_interval_secs);
        let mut task = self.sweep_task.lock();
        if task.is_none() {
            *task = Some(self.sweeper.spawn_periodic(interval));
        }
    }

    pub fn stop_retention_sweeps(&self) {
        if let Some(mut task) = self.sweep_task.lock().take() {
            task.stop();
        }
    }

    pub fn sweep_now(&self) -> crate::retention::SweepReport {
        self.sweeper.sweep()
    }

    // ── Reporting ───────────────────────────────────────────────────────────

    pub fn compliance_report(&self) -> ComplianceReport {
        let entries = self.audit.entries();
        let mut decisions_by_action: HashMap<String, u64> = HashMap::new();
        let mut decisions_by_role: HashMap<String, u64> = HashMap::new();
        let mut entries_by_risk: HashMap<String, u64> = HashMap::new();
        for entry in &entries {
            *decisions_by_action.entry(format!("{:?}", entry.action)).or_default() += 1;
            *decisions_by_role.entry(format!("{:?}", entry.actor_role)).or_default() += 1;
            *entries_by_risk.entry(format!("{:?}", entry.risk_level)).or_default() += 1;
        }

        let total_decisions = self.decisions.total_decisions();
        let total_denials = self.decisions.total_denials();
        let compliance_score = if total_decisions == 0 {
            100.0
        } else {
            (1.0 - total_denials as f64 / total_decisions as f64) * 100.0
        };

        ComplianceReport {
            generated_at: self.clock.now(),
            total_decisions,
            total_denials,
            decisions_by_action,
            decisions_by_role,
            entries_by_risk,
            retention_policies: self.sweeper.policies(),
            registered_fields: self.registry.len(),
            encrypted_fields: self.registry.encrypted_field_count(),
            compliance_score,
        }
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Mask every masking-required classified field, viewer-independent.
    fn mask_required(&self, bucket: &mut Bucket) -> u64 {
        let mut masked = 0;
        for (name, value) in bucket.iter_mut() {
            let Some(spec) = self.registry.classify(name) else { continue };
            if spec.masking_required {
                let replacement = self.masker.mask_value(name, value);
                if replacement != *value {
                    *value = replacement;
                    masked += 1;
                }
            }
        }
        masked
    }

    /// Highest risk among classified fields present in the buckets.
    fn bucket_risk(&self, buckets: &SubjectBuckets) -> Severity {
        let mut risk = Severity::Low;
        for (_, bucket) in buckets.iter() {
            for name in bucket.keys() {
                if let Some(spec) = self.registry.classify(name) {
                    risk = risk.max(spec.sensitivity.as_risk());
                }
            }
        }
        risk
    }

    #[allow(clippy::too_many_arguments)]
    fn record_granted(
        &self,
        actor: &Actor,
        action: Action,
        subject_id: &str,
        data_type: &str,
        decision: &AccessDecision,
        encryption_applied: bool,
        masking_applied: bool,
        risk_level: Severity,
    ) {
        let conditions = decision.conditions.as_ref();
        self.audit.record(AuditEvent {
            actor_id: actor.user_id.clone(),
            actor_role: actor.role,
            action,
            resource_type: "data_subject".into(),
            resource_id: subject_id.into(),
            subject_id: subject_id.into(),
            data_type: data_type.into(),
            purpose: actor.purpose,
            legal_basis: conditions.map(|c| c.legal_basis),
            consent_verified: conditions.map_or(false, |c| c.consent_verified),
            encryption_applied,
            masking_applied,
            risk_level,
        });
    }

    fn record_denied(&self, actor: &Actor, action: Action, subject_id: &str, decision: &AccessDecision) {
        self.audit.record(AuditEvent {
            actor_id: actor.user_id.clone(),
            actor_role: actor.role,
            action,
            resource_type: "data_subject".into(),
            resource_id: subject_id.into(),
            subject_id: subject_id.into(),
            data_type: "data_subject".into(),
            purpose: actor.purpose,
            legal_basis: None,
            consent_verified: false,
            encryption_applied: false,
            masking_applied: false,
            risk_level: Severity::Medium,
        });
    }

    // ── Component access ────────────────────────────────────────────────────

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn consents(&self) -> &ConsentLedger {
        &self.consents
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }
}

impl Drop for DataProtectionService {
    fn drop(&mut self) {
        self.stop_retention_sweeps();
    }
}

fn denial_error(decision: &AccessDecision) -> CustodiaError {
    CustodiaError::AccessDenied {
        reason: decision.reason.clone(),
        additional_consent_required: decision.additional_consent_required,
    }
}
