//! Data model for the policy engine.

use custodia_core::types::*;
use std::collections::{HashMap, HashSet};

// ── Field classification ────────────────────────────────────────────────────

/// Immutable sensitivity metadata for one field name. Fields absent from
/// the registry are non-sensitive pass-through.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SensitiveFieldSpec {
    pub name: String,
    pub category: DataCategory,
    pub sensitivity: Sensitivity,
    pub encryption_required: bool,
    pub masking_required: bool,
    pub retention_days: u32,
    pub allowed_roles: HashSet<Role>,
    pub allowed_purposes: HashSet<Purpose>,
    pub legal_basis: LegalBasis,
}

// ── Field values and buckets ────────────────────────────────────────────────

/// Closed variant for a stored field value. Every caller pattern-matches
/// the state a value is in; there is no "any"-typed bucket.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Plain(String),
    Number(f64),
    Flag(bool),
    /// Encrypted at rest; storage persists the envelope, not the plaintext.
    Sealed(EncryptionEnvelope),
    Masked(String),
    /// Decryption failed for this field; siblings stay readable.
    Unreadable,
    /// Disposal replaced the original with a pseudonym.
    Anonymized { pseudonym: String, anonymized_at: i64 },
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Plain(s) | FieldValue::Masked(s) => s.is_empty(),
            _ => false,
        }
    }
}

pub type Bucket = HashMap<String, FieldValue>;

/// The five category buckets of a data subject.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SubjectBuckets {
    pub personal: Bucket,
    pub health: Bucket,
    pub financial: Bucket,
    pub biometric: Bucket,
    pub contact: Bucket,
}

impl SubjectBuckets {
    pub fn get(&self, category: DataCategory) -> &Bucket {
        match category {
            DataCategory::Personal => &self.personal,
            DataCategory::Health => &self.health,
            DataCategory::Financial => &self.financial,
            DataCategory::Biometric => &self.biometric,
            DataCategory::Contact => &self.contact,
        }
    }

    pub fn get_mut(&mut self, category: DataCategory) -> &mut Bucket {
        match category {
            DataCategory::Personal => &mut self.personal,
            DataCategory::Health => &mut self.health,
            DataCategory::Financial => &mut self.financial,
            DataCategory::Biometric => &mut self.biometric,
            DataCategory::Contact => &mut self.contact,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataCategory, &Bucket)> {
        DataCategory::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    pub fn is_empty(&self) -> bool {
        DataCategory::ALL.iter().all(|&c| self.get(c).is_empty())
    }
}

// ── Subjects ────────────────────────────────────────────────────────────────

/// Data-subject rights flags (access, rectification, erasure, portability).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DataRights {
    pub access: bool,
    pub rectification: bool,
    pub erasure: bool,
    pub portability: bool,
}

impl Default for DataRights {
    fn default() -> Self {
        Self { access: true, rectification: true, erasure: true, portability: true }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DataSubject {
    pub id: String,
    pub subject_type: SubjectType,
    pub buckets: SubjectBuckets,
    pub rights: DataRights,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What a caller gets back from a granted read: per-field decrypted,
/// masked, or restricted values plus the consent history and the decision
/// that authorized the view.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubjectView {
    pub id: String,
    pub subject_type: SubjectType,
    pub buckets: SubjectBuckets,
    pub consents: Vec<Consent>,
    pub decision: AccessDecision,
}

// ── Consent ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Consent {
    pub id: String,
    pub consent_type: String,
    pub purpose: Purpose,
    pub granted_at: i64,
    pub expires_at: Option<i64>,
    pub withdrawn_at: Option<i64>,
    pub version: String,
}

impl Consent {
    /// Valid at `at` iff the purpose matches exactly, the consent has not
    /// expired, and any withdrawal happened strictly after `at`. A set
    /// `withdrawn_at` invalidates from that instant forward; evaluations
    /// at earlier instants remain valid historical facts.
    pub fn is_valid_at(&self, purpose: Purpose, at: i64) -> bool {
        self.purpose == purpose
            && self.expires_at.map_or(true, |exp| exp > at)
            && self.withdrawn_at.map_or(true, |w| at < w)
    }
}

/// Compliance transform applied by `ProcessPersonalData`-style flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProcessingOperation {
    Collect,
    Store,
    Share,
    Export,
}

// ── Access decisions ────────────────────────────────────────────────────────

/// The requesting actor. `deadline` is a caller-supplied epoch-second
/// cutoff; a request past it returns `Timeout`, never a false deny.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub purpose: Purpose,
    pub deadline: Option<i64>,
}

impl Actor {
    pub fn new(user_id: &str, role: Role, purpose: Purpose) -> Self {
        Self { user_id: user_id.into(), role, purpose, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: i64) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccessConditions {
    pub legal_basis: LegalBasis,
    pub consent_verified: bool,
    pub usage_limitations: Vec<String>,
}

/// Ephemeral decision result. Never persisted; mirrored into an audit
/// entry by the caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: String,
    pub conditions: Option<AccessConditions>,
    pub expires_at: Option<i64>,
    pub additional_consent_required: bool,
}

impl AccessDecision {
    pub fn denied(reason: &str) -> Self {
        Self {
            granted: false,
            reason: reason.into(),
            conditions: None,
            expires_at: None,
            additional_consent_required: false,
        }
    }
}

// ── Audit ───────────────────────────────────────────────────────────────────

/// Append-only, immutable once written.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditLogEntry {
    pub id: u64,
    pub timestamp: i64,
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

// ── Retention ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetentionPolicy {
    pub category: DataCategory,
    pub retention_days: u32,
    pub archival_days: Option<u32>,
    pub disposal_method: DisposalMethod,
    pub legal_hold: bool,
    pub automated_disposal: bool,
    pub confirmation_required: bool,
}

// ── Encryption envelope ─────────────────────────────────────────────────────

/// Serialized unit produced by encryption. The shape is stable across
/// versions so old encrypted data stays decryptable. `key_id` is the
/// sensitivity tier, not a secret.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EncryptionEnvelope {
    pub cipher_algorithm: String,
    pub key_id: Sensitivity,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub integrity_tag: Vec<u8>,
    pub created_at: i64,
}

// ── Compliance report ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ComplianceReport {
    pub generated_at: i64,
    pub total_decisions: u64,
    pub total_denials: u64,
    pub decisions_by_action: HashMap<String, u64>,
    pub decisions_by_role: HashMap<String, u64>,
    pub entries_by_risk: HashMap<String, u64>,
    pub retention_policies: Vec<RetentionPolicy>,
    pub registered_fields: usize,
    pub encrypted_fields: usize,
    pub compliance_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_expiry_in_past_never_valid() {
        let consent = Consent {
            id: "c1".into(),
            consent_type: "data_processing".into(),
            purpose: Purpose::Marketing,
            granted_at: 0,
            expires_at: Some(1_000),
            withdrawn_at: None,
            version: "1.0".into(),
        };
        assert!(consent.is_valid_at(Purpose::Marketing, 999));
        assert!(!consent.is_valid_at(Purpose::Marketing, 1_000));
        assert!(!consent.is_valid_at(Purpose::Marketing, 2_000));
    }

    #[test]
    fn test_withdrawal_invalidates_forward_only() {
        let consent = Consent {
            id: "c2".into(),
            consent_type: "data_processing".into(),
            purpose: Purpose::Treatment,
            granted_at: 0,
            expires_at: None,
            withdrawn_at: Some(500),
            version: "1.0".into(),
        };
        // Historical evaluation before withdrawal stays valid.
        assert!(consent.is_valid_at(Purpose::Treatment, 499));
        assert!(!consent.is_valid_at(Purpose::Treatment, 500));
        assert!(!consent.is_valid_at(Purpose::Treatment, 9_999));
    }

    #[test]
    fn test_purpose_must_match_exactly() {
        let consent = Consent {
            id: "c3".into(),
            consent_type: "data_processing".into(),
            purpose: Purpose::Treatment,
            granted_at: 0,
            expires_at: None,
            withdrawn_at: None,
            version: "1.0".into(),
        };
        assert!(consent.is_valid_at(Purpose::Treatment, 10));
        assert!(!consent.is_valid_at(Purpose::Marketing, 10));
    }

    #[test]
    fn test_bucket_accessors_cover_all_categories() {
        let mut buckets = SubjectBuckets::default();
        for category in DataCategory::ALL {
            buckets
                .get_mut(category)
                .insert("field".into(), FieldValue::Plain("v".into()));
        }
        assert_eq!(buckets.iter().count(), 5);
        assert!(buckets.iter().all(|(_, b)| b.len() == 1));
    }
}
