//! Consent Ledger — tracks grant/withdraw/expiry per data subject and
//! purpose. Append-only per subject: withdrawal sets a timestamp, it never
//! mutates or removes prior grants, so pre-withdrawal reads remain valid
//! historical facts in the audit log.

use crate::types::Consent;
use custodia_core::clock::Clock;
use custodia_core::types::Purpose;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct ConsentLedger {
    consents: RwLock<HashMap<String, Vec<Consent>>>,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    total_granted: AtomicU64,
    total_withdrawn: AtomicU64,
}

impl ConsentLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            consents: RwLock::new(HashMap::new()),
            clock,
            next_id: AtomicU64::new(1),
            total_granted: AtomicU64::new(0),
            total_withdrawn: AtomicU64::new(0),
        }
    }

    /// Append a new consent for a subject. Returns the consent id.
    pub fn grant(
        &self,
        subject_id: &str,
        consent_type: &str,
        purpose: Purpose,
        expires_at: Option<i64>,
        version: &str,
    ) -> String {
        let id = format!("consent_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let consent = Consent {
            id: id.clone(),
            consent_type: consent_type.into(),
            purpose,
            granted_at: self.clock.now(),
            expires_at,
            withdrawn_at: None,
            version: version.into(),
        };
        self.total_granted.fetch_add(1, Ordering::Relaxed);
        info!(subject = %subject_id, purpose = ?purpose, consent = %id, "Consent granted");
        self.consents
            .write()
            .entry(subject_id.to_string())
            .or_default()
            .push(consent);
        id
    }

    /// Set `withdrawn_at = now`. Returns false if subject or consent is
    /// unknown. Not retroactive: validity checks at earlier instants are
    /// unaffected.
    pub fn withdraw(&self, subject_id: &str, consent_id: &str) -> bool {
        let now = self.clock.now();
        let mut consents = self.consents.write();
        let Some(list) = consents.get_mut(subject_id) else {
            return false;
        };
        let Some(consent) = list.iter_mut().find(|c| c.id == consent_id) else {
            return false;
        };
        if consent.withdrawn_at.is_none() {
            consent.withdrawn_at = Some(now);
            self.total_withdrawn.fetch_add(1, Ordering::Relaxed);
            info!(subject = %subject_id, consent = %consent_id, "Consent withdrawn");
        }
        true
    }

    /// Does the subject hold a consent valid for `purpose` at instant `at`?
    pub fn is_valid(&self, subject_id: &str, purpose: Purpose, at: i64) -> bool {
        self.consents
            .read()
            .get(subject_id)
            .map_or(false, |list| list.iter().any(|c| c.is_valid_at(purpose, at)))
    }

    pub fn consents_for(&self, subject_id: &str) -> Vec<Consent> {
        self.consents.read().get(subject_id).cloned().unwrap_or_default()
    }

    /// Drop all consent records for a subject (used on subject deletion).
    pub fn forget(&self, subject_id: &str) {
        self.consents.write().remove(subject_id);
    }

    pub fn total_granted(&self) -> u64 {
        self.total_granted.load(Ordering::Relaxed)
    }

    pub fn total_withdrawn(&self) -> u64 {
        self.total_withdrawn.load(Ordering::Relaxed)
    }
}
