//! Shared vocabulary for the Custodia policy engine.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Severity { Low, Medium, High, Critical }

/// The five buckets a data subject's records are partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DataCategory { Personal, Health, Financial, Biometric, Contact }

impl DataCategory {
    pub const ALL: [DataCategory; 5] = [
        DataCategory::Personal,
        DataCategory::Health,
        DataCategory::Financial,
        DataCategory::Biometric,
        DataCategory::Contact,
    ];
}

/// Sensitivity tier — selects which encryption key a field is sealed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Sensitivity { Low, Medium, High, Critical }

impl Sensitivity {
    pub fn as_risk(self) -> Severity {
        match self {
            Sensitivity::Low => Severity::Low,
            Sensitivity::Medium => Severity::Medium,
            Sensitivity::High => Severity::High,
            Sensitivity::Critical => Severity::Critical,
        }
    }
}

/// Lawful ground justifying processing of a given field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LegalBasis { Consent, LegitimateInterest, VitalInterest, LegalObligation }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Role { Admin, Professional, Receptionist, Marketing, Compliance, System }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Purpose { Treatment, Scheduling, Billing, Marketing, Audit, LegalDefense }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Action { Create, Read, Update, Delete, Export, Share }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SubjectType { Client, Professional, Employee, Supplier }

/// Terminal handling of data once its retention window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DisposalMethod { PermanentDeletion, Anonymization, Archival }

/// Advisory notice pushed to the alerting collaborator. Alerts never block
/// the originating operation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineAlert {
    pub timestamp: i64,
    pub severity: Severity,
    pub component: String,
    pub title: String,
    pub details: String,
}
