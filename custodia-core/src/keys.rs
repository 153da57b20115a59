//! Key Provider — opaque secrets indexed by sensitivity tier.
//!
//! Key generation, rotation, and secure storage belong to a dedicated
//! key-management collaborator; the engine only asks for the key of a tier.

use crate::types::Sensitivity;
use rand::RngCore;
use std::collections::HashMap;
use zeroize::Zeroizing;

pub const KEY_SIZE: usize = 32;

/// Tier → secret key lookup. `None` means no key is provisioned for the
/// tier, which the envelope codec reports as an encryption failure.
pub trait KeyProvider: Send + Sync {
    fn key_for(&self, tier: Sensitivity) -> Option<Zeroizing<[u8; KEY_SIZE]>>;
}

/// Fixed in-memory key set. Production deployments wrap their KMS behind
/// the same trait.
pub struct StaticKeyProvider {
    keys: HashMap<Sensitivity, Zeroizing<[u8; KEY_SIZE]>>,
}

impl StaticKeyProvider {
    pub fn new() -> Self {
        Self { keys: HashMap::new() }
    }

    pub fn with_key(mut self, tier: Sensitivity, key: [u8; KEY_SIZE]) -> Self {
        self.keys.insert(tier, Zeroizing::new(key));
        self
    }

    /// Fresh random key per tier. Useful for tests and ephemeral stores;
    /// the keys are lost when the provider is dropped.
    pub fn random() -> Self {
        let mut provider = Self::new();
        for tier in [Sensitivity::Low, Sensitivity::Medium, Sensitivity::High, Sensitivity::Critical] {
            let mut key = [0u8; KEY_SIZE];
            rand::rngs::OsRng.fill_bytes(&mut key);
            provider.keys.insert(tier, Zeroizing::new(key));
        }
        provider
    }
}

impl Default for StaticKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key_for(&self, tier: Sensitivity) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
        self.keys.get(&tier).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tier_yields_none() {
        let provider = StaticKeyProvider::new().with_key(Sensitivity::High, [7u8; KEY_SIZE]);
        assert!(provider.key_for(Sensitivity::High).is_some());
        assert!(provider.key_for(Sensitivity::Critical).is_none());
    }

    #[test]
    fn test_random_provider_covers_all_tiers() {
        let provider = StaticKeyProvider::random();
        for tier in [Sensitivity::Low, Sensitivity::Medium, Sensitivity::High, Sensitivity::Critical] {
            assert!(provider.key_for(tier).is_some());
        }
        // Distinct keys per tier.
        let low = provider.key_for(Sensitivity::Low).unwrap();
        let critical = provider.key_for(Sensitivity::Critical).unwrap();
        assert_ne!(*low, *critical);
    }
}
