//! # Custodia Engine — data-protection and access-control policy core
//!
//! For every piece of personal/health/financial/biometric/contact data the
//! engine decides whether an actor may see it, in what form (plain, masked,
//! sealed, restricted), under which legal basis, and for how long it may be
//! retained before mandatory disposal. Four policies are reconciled per
//! request: field sensitivity classification, role-based purpose-limited
//! access, consent validity, and retention/disposal schedules. Every
//! attempt, granted or denied, lands in the audit log, which feeds a
//! lightweight anomaly detector.
//!
//! This is a library-level policy core: storage, key management, and
//! alerting are injected collaborators (see `custodia-core`).

pub mod access;
pub mod audit;
pub mod consent;
pub mod envelope;
pub mod masking;
pub mod registry;
pub mod retention;
pub mod service;
pub mod store;
pub mod types;

pub use access::AccessDecisionEngine;
pub use audit::{AuditEvent, AuditFilter, AuditLog};
pub use consent::ConsentLedger;
pub use envelope::EnvelopeCodec;
pub use masking::DataMasker;
pub use registry::FieldRegistry;
pub use retention::{RetentionSweeper, SweepReport};
pub use service::DataProtectionService;
pub use store::{InMemorySubjectStore, SubjectStore};
