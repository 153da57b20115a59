//! Encryption Envelope Codec — per-field AES-256-GCM sealing.
//!
//! Each sensitive value is sealed under the key of its sensitivity tier
//! with a fresh random IV per call. The GCM tag is stored detached in the
//! envelope and integrity is verified before any plaintext is released;
//! a checksum is not an authentication tag.

use crate::registry::FieldRegistry;
use crate::types::{Bucket, EncryptionEnvelope, FieldValue};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use custodia_core::clock::Clock;
use custodia_core::error::{CustodiaError, CustodiaResult};
use custodia_core::keys::KeyProvider;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

pub const CIPHER_ALGORITHM: &str = "AES-256-GCM";
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

pub struct EnvelopeCodec {
    registry: Arc<FieldRegistry>,
    keys: Arc<dyn KeyProvider>,
    clock: Arc<dyn Clock>,
    total_sealed: AtomicU64,
    total_opened: AtomicU64,
    total_failures: AtomicU64,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<FieldRegistry>, keys: Arc<dyn KeyProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            keys,
            clock,
            total_sealed: AtomicU64::new(0),
            total_opened: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Seal one field value under its tier key.
    pub fn seal(&self, field_name: &str, value: &FieldValue) -> CustodiaResult<EncryptionEnvelope> {
        let spec = self.registry.classify(field_name).ok_or_else(|| {
            CustodiaError::EncryptionFailure(format!("field '{}' is not classified", field_name))
        })?;
        let tier = spec.sensitivity;

        let key = self.keys.key_for(tier).ok_or_else(|| {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
            CustodiaError::EncryptionFailure(format!("no key provisioned for tier {:?}", tier))
        })?;

        let plaintext = serde_json::to_vec(value)
            .map_err(|e| CustodiaError::EncryptionFailure(format!("serialize: {}", e)))?;

        let cipher = Aes256Gcm::new_from_slice(&*key)
            .map_err(|e| CustodiaError::EncryptionFailure(format!("cipher init: {}", e)))?;

        // Fresh random IV per call; never reused under the same key.
        let mut iv = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_ref())
            .map_err(|e| {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                CustodiaError::EncryptionFailure(format!("encrypt: {}", e))
            })?;
        let integrity_tag = sealed.split_off(sealed.len() - TAG_SIZE);

        self.total_sealed.fetch_add(1, Ordering::Relaxed);
        Ok(EncryptionEnvelope {
            cipher_algorithm: CIPHER_ALGORITHM.into(),
            key_id: tier,
            iv: iv.to_vec(),
            ciphertext: sealed,
            integrity_tag,
            created_at: self.clock.now(),
        })
    }

    /// Open an envelope. Integrity is checked before plaintext is returned.
    pub fn open(&self, envelope: &EncryptionEnvelope) -> CustodiaResult<FieldValue> {
        if envelope.cipher_algorithm != CIPHER_ALGORITHM {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
            return Err(CustodiaError::DecryptionFailure(format!(
                "unknown algorithm '{}'",
                envelope.cipher_algorithm
            )));
        }
        if envelope.iv.len() != NONCE_SIZE || envelope.integrity_tag.len() != TAG_SIZE {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
            return Err(CustodiaError::DecryptionFailure("malformed envelope".into()));
        }

        let key = self.keys.key_for(envelope.key_id).ok_or_else(|| {
            self.total_failures.fetch_add(1, Ordering::Relaxed);
            CustodiaError::DecryptionFailure(format!("no key for tier {:?}", envelope.key_id))
        })?;

        let cipher = Aes256Gcm::new_from_slice(&*key)
            .map_err(|e| CustodiaError::DecryptionFailure(format!("cipher init: {}", e)))?;

        let mut sealed = envelope.ciphertext.clone();
        sealed.extend_from_slice(&envelope.integrity_tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&envelope.iv), Payload::from(sealed.as_slice()))
            .map_err(|_| {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                CustodiaError::DecryptionFailure("integrity check failed".into())
            })?;

        let value = serde_json::from_slice(&plaintext)
            .map_err(|e| CustodiaError::DecryptionFailure(format!("deserialize: {}", e)))?;
        self.total_opened.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Seal every encryption-required field of a bucket. Fields are sealed
    /// independently: a failure on one leaves its siblings (and the failed
    /// field's original value) intact. The caller decides whether a
    /// partial failure aborts the whole write.
    pub fn seal_bucket(&self, bucket: &mut Bucket) -> Vec<(String, CustodiaError)> {
        let mut failures = Vec::new();
        for (name, value) in bucket.iter_mut() {
            let needs_seal = matches!(value, FieldValue::Plain(_) | FieldValue::Number(_) | FieldValue::Flag(_))
                && !value.is_empty()
                && self.registry.classify(name).map_or(false, |s| s.encryption_required);
            if !needs_seal {
                continue;
            }
            match self.seal(name, value) {
                Ok(envelope) => *value = FieldValue::Sealed(envelope),
                Err(e) => {
                    warn!(field = %name, error = %e, "Field encryption failed");
                    failures.push((name.clone(), e));
                }
            }
        }
        failures
    }

    /// Open every sealed field of a bucket. A field that fails its
    /// integrity check is replaced with the `Unreadable` sentinel so a
    /// corruption in one field never denies access to the rest.
    pub fn open_bucket(&self, bucket: &mut Bucket) -> Vec<String> {
        let mut unreadable = Vec::new();
        for (name, value) in bucket.iter_mut() {
            let envelope = match value {
                FieldValue::Sealed(envelope) => envelope.clone(),
                _ => continue,
            };
            match self.open(&envelope) {
                Ok(plain) => *value = plain,
                Err(e) => {
                    warn!(field = %name, error = %e, "Field decryption failed, substituting sentinel");
                    *value = FieldValue::Unreadable;
                    unreadable.push(name.clone());
                }
            }
        }
        unreadable
    }

    pub fn total_sealed(&self) -> u64 {
        self.total_sealed.load(Ordering::Relaxed)
    }

    pub fn total_opened(&self) -> u64 {
        self.total_opened.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }
}
