//! Data Masker — partial redaction for display to partially-authorized
//! roles. Masked output keeps just enough shape to be recognizable at a
//! front desk without exposing the identifier itself.
//!
//! Masking is idempotent by construction: an already-masked value is a
//! distinct variant and is returned untouched, and every strategy emits a
//! fixed shape that carries no maskable residue.

use crate::registry::FieldRegistry;
use crate::types::{FieldValue, SubjectBuckets};
use custodia_core::types::Role;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct DataMasker {
    registry: Arc<FieldRegistry>,
    total_masked: AtomicU64,
}

impl DataMasker {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self { registry, total_masked: AtomicU64::new(0) }
    }

    /// Mask one value according to the field's strategy. Non-plain values
    /// pass through unchanged; there is nothing left in them to hide.
    pub fn mask_value(&self, field_name: &str, value: &FieldValue) -> FieldValue {
        match value {
            FieldValue::Plain(text) => {
                self.total_masked.fetch_add(1, Ordering::Relaxed);
                FieldValue::Masked(mask_text(field_name, text))
            }
            FieldValue::Number(_) | FieldValue::Flag(_) => {
                self.total_masked.fetch_add(1, Ordering::Relaxed);
                FieldValue::Masked("***MASKED***".into())
            }
            other => other.clone(),
        }
    }

    /// Redact a full subject view for the given role. Fields whose
    /// classification excludes the role are masked when the strategy
    /// allows partial display, withheld entirely otherwise. Unclassified
    /// fields pass through.
    pub fn redact_view(&self, role: Role, buckets: &mut SubjectBuckets) -> u64 {
        let mut masked = 0;
        for category in custodia_core::types::DataCategory::ALL {
            let bucket = buckets.get_mut(category);
            let mut withheld: Vec<String> = Vec::new();
            for (name, value) in bucket.iter_mut() {
                let Some(spec) = self.registry.classify(name) else {
                    continue;
                };
                if spec.allowed_roles.contains(&role) {
                    continue;
                }
                if spec.masking_required {
                    let replacement = self.mask_value(name, value);
                    if replacement != *value {
                        *value = replacement;
                        masked += 1;
                    }
                } else {
                    withheld.push(name.clone());
                }
            }
            for name in withheld {
                bucket.remove(&name);
            }
        }
        masked
    }

    pub fn total_masked(&self) -> u64 {
        self.total_masked.load(Ordering::Relaxed)
    }
}

/// Per-field masking strategy, keyed by field name.
fn mask_text(field_name: &str, text: &str) -> String {
    match field_name.to_lowercase().as_str() {
        "cpf" => mask_cpf(text),
        "email" => mask_email(text),
        "phone" | "credit_card" | "bank_account" | "rg" => mask_keep_last(text, 4),
        "name" | "address" => mask_first_word(text),
        "birth_date" => "****-**-**".into(),
        _ => "***MASKED***".into(),
    }
}

/// `123.456.789-00` → `123.***.***-00`. Inputs without the canonical
/// shape fall back to full masking.
fn mask_cpf(text: &str) -> String {
    let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 11 {
        return "***MASKED***".into();
    }
    format!(
        "{}{}{}.***.***-{}{}",
        digits[0], digits[1], digits[2], digits[9], digits[10]
    )
}

/// `joana@example.com` → `j***@example.com`.
fn mask_email(text: &str) -> String {
    match text.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        _ => "***MASKED***".into(),
    }
}

/// Keep the last `keep` digits, star the rest.
fn mask_keep_last(text: &str, keep: usize) -> String {
    let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= keep {
        return "***MASKED***".into();
    }
    let tail: String = digits[digits.len() - keep..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - keep), tail)
}

/// Keep the first word only: `Joana Silva Prado` → `Joana ***`.
fn mask_first_word(text: &str) -> String {
    match text.split_whitespace().next() {
        Some(first) => format!("{} ***", first),
        None => "***MASKED***".into(),
    }
}
