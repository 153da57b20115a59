//! Field Classification Registry — field name → sensitivity metadata.
//!
//! Pure lookup, no side effects. "Not sensitive" is a valid non-error
//! outcome: fields absent from the table pass through unchanged.

use crate::types::SensitiveFieldSpec;
use custodia_core::types::*;
use std::collections::{HashMap, HashSet};

pub struct FieldRegistry {
    specs: HashMap<String, SensitiveFieldSpec>,
}

fn spec(
    name: &str,
    category: DataCategory,
    sensitivity: Sensitivity,
    encryption_required: bool,
    masking_required: bool,
    retention_days: u32,
    allowed_roles: &[Role],
    allowed_purposes: &[Purpose],
    legal_basis: LegalBasis,
) -> SensitiveFieldSpec {
    SensitiveFieldSpec {
        name: name.into(),
        category,
        sensitivity,
        encryption_required,
        masking_required,
        retention_days,
        allowed_roles: allowed_roles.iter().copied().collect::<HashSet<_>>(),
        allowed_purposes: allowed_purposes.iter().copied().collect::<HashSet<_>>(),
        legal_basis,
    }
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self { specs: HashMap::new() }
    }

    /// Builtin classification table covering the five categories.
    pub fn with_defaults() -> Self {
        use DataCategory::*;
        use LegalBasis::*;
        use Purpose::*;
        use Role::*;
        use Sensitivity as S;

        let clinical = &[Admin, Professional, Compliance][..];
        let front_desk = &[Admin, Professional, Receptionist, Compliance][..];
        let finance = &[Admin, Compliance][..];

        let mut registry = Self::new();
        let table = [
            // Personal identifiers
            spec("name", Personal, S::Medium, false, true, 1_825, front_desk, &[Treatment, Scheduling, Billing, Audit], Consent),
            spec("cpf", Personal, S::High, true, true, 1_825, front_desk, &[Treatment, Billing, Audit, LegalDefense], LegalObligation),
            spec("rg", Personal, S::High, true, true, 1_825, front_desk, &[Treatment, Billing, Audit], LegalObligation),
            spec("birth_date", Personal, S::Medium, false, true, 1_825, front_desk, &[Treatment, Scheduling, Audit], Consent),
            // Health record
            spec("medical_history", Health, S::Critical, true, false, 7_300, clinical, &[Treatment, Audit], Consent),
            spec("allergies", Health, S::High, true, false, 7_300, clinical, &[Treatment, Audit], VitalInterest),
            spec("medications", Health, S::High, true, false, 7_300, clinical, &[Treatment, Audit], Consent),
            spec("blood_type", Health, S::High, true, false, 7_300, clinical, &[Treatment, Audit], VitalInterest),
            spec("treatment_notes", Health, S::Critical, true, false, 7_300, clinical, &[Treatment, Audit], Consent),
            // Financial
            spec("bank_account", Financial, S::Critical, true, true, 1_825, finance, &[Billing, Audit, LegalDefense], Consent),
            spec("credit_card", Financial, S::Critical, true, true, 1_825, finance, &[Billing, Audit], Consent),
            spec("income", Financial, S::High, true, false, 1_825, finance, &[Billing, Audit], LegitimateInterest),
            // Biometric
            spec("fingerprint", Biometric, S::Critical, true, false, 1_095, clinical, &[Treatment, Audit], Consent),
            spec("facial_geometry", Biometric, S::Critical, true, false, 1_095, clinical, &[Treatment, Audit], Consent),
            spec("voice_print", Biometric, S::Critical, true, false, 1_095, clinical, &[Treatment, Audit], Consent),
            // Contact
            spec("email", Contact, S::Medium, false, true, 1_825, front_desk, &[Treatment, Scheduling, Billing, Marketing, Audit], Consent),
            spec("phone", Contact, S::Medium, false, true, 1_825, front_desk, &[Treatment, Scheduling, Billing, Marketing, Audit], Consent),
            spec("address", Contact, S::Medium, false, true, 1_825, front_desk, &[Treatment, Scheduling, Billing, Audit], Consent),
        ];
        for s in table {
            registry.register(s);
        }
        registry
    }

    /// Pre-load registration. The registry is immutable once shared with
    /// the engine (it is handed over behind an `Arc`).
    pub fn register(&mut self, spec: SensitiveFieldSpec) {
        self.specs.insert(spec.name.to_lowercase(), spec);
    }

    /// `None` means "not sensitive", not an error.
    pub fn classify(&self, field_name: &str) -> Option<&SensitiveFieldSpec> {
        self.specs.get(&field_name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn encrypted_field_count(&self) -> usize {
        self.specs.values().filter(|s| s.encryption_required).count()
    }

    pub fn specs(&self) -> impl Iterator<Item = &SensitiveFieldSpec> {
        self.specs.values()
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
