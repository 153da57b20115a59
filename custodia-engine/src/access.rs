//! Access Decision Engine — role/purpose/consent reconciliation.
//!
//! A pure decision function per call: no persistent state beyond counters.
//! Checks run in order and short-circuit at the first failure: subject
//! existence, role permission for the action, purpose limitation, then
//! consent validity (unless the role bypasses consent). Denials are
//! inspectable values; only "subject not found" and deadline expiry are
//! errors.

use crate::consent::ConsentLedger;
use crate::types::{AccessConditions, AccessDecision, Actor};
use custodia_core::config::DecisionConfig;
use custodia_core::error::{CustodiaError, CustodiaResult};
use custodia_core::types::{Action, LegalBasis, Purpose, Role};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Static per-role permission entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RolePermission {
    pub allowed_actions: HashSet<Action>,
    pub allowed_purposes: HashSet<Purpose>,
    pub bypass_consent: bool,
    pub usage_limitations: Vec<String>,
    pub legal_basis: LegalBasis,
}

fn permission(
    actions: &[Action],
    purposes: &[Purpose],
    bypass_consent: bool,
    limitations: &[&str],
    legal_basis: LegalBasis,
) -> RolePermission {
    RolePermission {
        allowed_actions: actions.iter().copied().collect(),
        allowed_purposes: purposes.iter().copied().collect(),
        bypass_consent,
        usage_limitations: limitations.iter().map(|s| s.to_string()).collect(),
        legal_basis,
    }
}

pub struct AccessDecisionEngine {
    permissions: RwLock<HashMap<Role, RolePermission>>,
    expiry: DecisionConfig,
    consents: Arc<ConsentLedger>,
    total_decisions: AtomicU64,
    total_denials: AtomicU64,
}

impl AccessDecisionEngine {
    pub fn new(expiry: DecisionConfig, consents: Arc<ConsentLedger>) -> Self {
        use Action::*;
        use LegalBasis::*;
        use Purpose::*;

        let mut table = HashMap::new();
        table.insert(
            Role::Admin,
            permission(
                &[Create, Read, Update, Delete, Export, Share],
                &[Treatment, Scheduling, Billing, Audit],
                false,
                &["internal_use_only"],
                LegitimateInterest,
            ),
        );
        table.insert(
            Role::Professional,
            permission(
                &[Create, Read, Update],
                &[Treatment],
                false,
                &["treatment_scope_only"],
                Consent,
            ),
        );
        table.insert(
            Role::Receptionist,
            permission(
                &[Create, Read, Update],
                &[Scheduling, Billing],
                false,
                &["front_desk_scope_only"],
                Consent,
            ),
        );
        table.insert(
            Role::Marketing,
            permission(
                &[Read],
                &[Purpose::Marketing],
                false,
                &["opt_in_contacts_only", "no_health_data"],
                Consent,
            ),
        );
        // Compliance audits must run even for subjects with zero consents.
        table.insert(
            Role::Compliance,
            permission(
                &[Read, Export],
                &[Audit, LegalDefense],
                true,
                &["audit_trail_required"],
                LegalObligation,
            ),
        );
        table.insert(
            Role::System,
            permission(
                &[Create, Read, Update, Delete],
                &[Treatment, Scheduling, Billing],
                false,
                &["automated_pipeline_only"],
                LegitimateInterest,
            ),
        );

        Self {
            permissions: RwLock::new(table),
            expiry,
            consents,
            total_decisions: AtomicU64::new(0),
            total_denials: AtomicU64::new(0),
        }
    }

    /// Replace the entry for one role. Intended for configuration at
    /// construction time, before the engine starts serving decisions.
    pub fn set_permission(&self, role: Role, perm: RolePermission) {
        self.permissions.write().insert(role, perm);
    }

    /// Decide whether `actor` may perform `action` on the subject.
    ///
    /// `NotFound` and `Timeout` are errors; every other outcome is a
    /// decision value. The caller mirrors each decision, granted or
    /// denied, into the audit log.
    pub fn decide(
        &self,
        actor: &Actor,
        action: Action,
        subject_id: &str,
        subject_exists: bool,
        at: i64,
    ) -> CustodiaResult<AccessDecision> {
        if let Some(deadline) = actor.deadline {
            if at > deadline {
                return Err(CustodiaError::Timeout);
            }
        }

        if !subject_exists {
            return Err(CustodiaError::NotFound(subject_id.to_string()));
        }

        // Only calls that reach a decision value count toward the totals;
        // timeouts and missing subjects are errors, not decisions.
        self.total_decisions.fetch_add(1, Ordering::Relaxed);

        let permissions = self.permissions.read();
        let Some(perm) = permissions.get(&actor.role) else {
            self.total_denials.fetch_add(1, Ordering::Relaxed);
            warn!(actor = %actor.user_id, role = ?actor.role, "Access denied: unknown role");
            return Ok(AccessDecision::denied("insufficient permissions"));
        };

        if !perm.allowed_actions.contains(&action) {
            self.total_denials.fetch_add(1, Ordering::Relaxed);
            warn!(actor = %actor.user_id, role = ?actor.role, action = ?action, "Access denied: action not permitted");
            return Ok(AccessDecision::denied("insufficient permissions"));
        }

        if !perm.allowed_purposes.contains(&actor.purpose) {
            self.total_denials.fetch_add(1, Ordering::Relaxed);
            warn!(actor = %actor.user_id, purpose = ?actor.purpose, "Access denied: purpose not permitted");
            return Ok(AccessDecision::denied("purpose not permitted"));
        }

        let consent_verified = if perm.bypass_consent {
            false
        } else {
            if !self.consents.is_valid(subject_id, actor.purpose, at) {
                self.total_denials.fetch_add(1, Ordering::Relaxed);
                warn!(actor = %actor.user_id, subject = %subject_id, purpose = ?actor.purpose, "Access denied: no valid consent");
                return Ok(AccessDecision {
                    granted: false,
                    reason: format!("no valid consent for purpose {:?}", actor.purpose),
                    conditions: None,
                    expires_at: None,
                    additional_consent_required: true,
                });
            }
            true
        };

        Ok(AccessDecision {
            granted: true,
            reason: "granted".into(),
            conditions: Some(AccessConditions {
                legal_basis: perm.legal_basis,
                consent_verified,
                usage_limitations: perm.usage_limitations.clone(),
            }),
            expires_at: Some(at + self.expiry.expiry_secs(action)),
            additional_consent_required: false,
        })
    }

    pub fn total_decisions(&self) -> u64 {
        self.total_decisions.load(Ordering::Relaxed)
    }

    pub fn total_denials(&self) -> u64 {
        self.total_denials.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::clock::ManualClock;

    fn engine() -> (Arc<ConsentLedger>, AccessDecisionEngine) {
        let ledger = Arc::new(ConsentLedger::new(Arc::new(ManualClock::new(1_000))));
        let engine = AccessDecisionEngine::new(DecisionConfig::default(), ledger.clone());
        (ledger, engine)
    }

    #[test]
    fn test_missing_subject_is_not_found() {
        let (_, engine) = engine();
        let actor = Actor::new("u1", Role::Admin, Purpose::Audit);
        let result = engine.decide(&actor, Action::Read, "ghost", false, 1_000);
        assert_eq!(result, Err(CustodiaError::NotFound("ghost".into())));
    }

    #[test]
    fn test_errors_do_not_count_as_decisions() {
        let (_, engine) = engine();
        let actor = Actor::new("u1", Role::Admin, Purpose::Audit);
        let _ = engine.decide(&actor, Action::Read, "ghost", false, 1_000);
        let late = actor.clone().with_deadline(500);
        let _ = engine.decide(&late, Action::Read, "s1", true, 1_000);
        assert_eq!(engine.total_decisions(), 0);
        assert_eq!(engine.total_denials(), 0);

        let denied = engine.decide(&actor, Action::Share, "s1", true, 1_000).unwrap();
        assert!(!denied.granted);
        assert_eq!(engine.total_decisions(), 1);
        assert_eq!(engine.total_denials(), 1);
    }

    #[test]
    fn test_action_outside_role_always_denied_regardless_of_consent() {
        let (ledger, engine) = engine();
        ledger.grant("s1", "data_processing", Purpose::Marketing, None, "1.0");
        // Marketing can only read; delete denies even with valid consent.
        let actor = Actor::new("u1", Role::Marketing, Purpose::Marketing);
        let decision = engine.decide(&actor, Action::Delete, "s1", true, 1_000).unwrap();
        assert!(!decision.granted);
        assert_eq!(decision.reason, "insufficient permissions");
        assert!(!decision.additional_consent_required);
    }

    #[test]
    fn test_purpose_outside_role_denied() {
        let (_, engine) = engine();
        let actor = Actor::new("u1", Role::Professional, Purpose::Marketing);
        let decision = engine.decide(&actor, Action::Read, "s1", true, 1_000).unwrap();
        assert!(!decision.granted);
        assert_eq!(decision.reason, "purpose not permitted");
    }

    #[test]
    fn test_no_consent_requests_additional_consent() {
        // Scenario A: marketing/marketing with no consent on file.
        let (_, engine) = engine();
        let actor = Actor::new("mkt1", Role::Marketing, Purpose::Marketing);
        let decision = engine.decide(&actor, Action::Read, "s1", true, 1_000).unwrap();
        assert!(!decision.granted);
        assert!(decision.additional_consent_required);
    }

    #[test]
    fn test_compliance_bypasses_consent() {
        // Scenario B: compliance export on a subject with zero consents.
        let (_, engine) = engine();
        let actor = Actor::new("aud1", Role::Compliance, Purpose::Audit);
        let decision = engine.decide(&actor, Action::Export, "s1", true, 1_000).unwrap();
        assert!(decision.granted);
        let conditions = decision.conditions.unwrap();
        assert!(!conditions.consent_verified);
        assert_eq!(conditions.legal_basis, LegalBasis::LegalObligation);
    }

    #[test]
    fn test_grant_carries_conditions_and_expiry() {
        let (ledger, engine) = engine();
        ledger.grant("s1", "data_processing", Purpose::Treatment, None, "1.0");
        let actor = Actor::new("dr1", Role::Professional, Purpose::Treatment);
        let decision = engine.decide(&actor, Action::Update, "s1", true, 1_000).unwrap();
        assert!(decision.granted);
        assert_eq!(decision.expires_at, Some(1_000 + 7_200));
        let conditions = decision.conditions.unwrap();
        assert!(conditions.consent_verified);
        assert!(conditions.usage_limitations.contains(&"treatment_scope_only".to_string()));
    }

    #[test]
    fn test_expired_deadline_is_timeout_not_denial() {
        let (_, engine) = engine();
        let actor = Actor::new("u1", Role::Admin, Purpose::Audit).with_deadline(500);
        let result = engine.decide(&actor, Action::Read, "s1", true, 1_000);
        assert_eq!(result, Err(CustodiaError::Timeout));
    }
}
