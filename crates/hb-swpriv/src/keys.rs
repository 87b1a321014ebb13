//! Key material: client master key, PRF seeds, state subkey derivation

use hb_core::{HbError, HbResult};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The client's 256-bit master key. Never leaves the client.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 256-bit PRF seed: the state's `f`/`alpha` keys and challenge keys.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedKey {
    bytes: [u8; KEY_SIZE],
}

impl SeedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SeedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SeedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Subkeys used to seal a [`crate::State`].
pub(crate) struct StateKeys {
    pub(crate) enc: [u8; KEY_SIZE],
    pub(crate) mac: [u8; KEY_SIZE],
}

impl Drop for StateKeys {
    fn drop(&mut self) {
        self.enc.zeroize();
        self.mac.zeroize();
    }
}

impl StateKeys {
    pub(crate) fn derive(master: &MasterKey) -> HbResult<Self> {
        Ok(Self {
            enc: hkdf_derive(master.as_bytes(), b"hb-state-enc")?,
            mac: hkdf_derive(master.as_bytes(), b"hb-state-mac")?,
        })
    }
}

/// HKDF-SHA256 key derivation with a domain-specific info string.
fn hkdf_derive(ikm: &[u8; KEY_SIZE], info: &[u8]) -> HbResult<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| HbError::Other(anyhow::anyhow!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_seed_generation() {
        let mut rng = StdRng::seed_from_u64(7);
        let k1 = SeedKey::generate(&mut rng);
        let k2 = SeedKey::generate(&mut rng);
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random seeds must differ");
    }

    #[test]
    fn test_state_subkeys_differ() {
        let master = MasterKey::from_bytes([42u8; KEY_SIZE]);
        let keys = StateKeys::derive(&master).unwrap();
        assert_ne!(keys.enc, keys.mac, "different domains must produce different keys");
        assert_ne!(&keys.enc, master.as_bytes());
    }

    #[test]
    fn test_state_subkeys_deterministic() {
        let master = MasterKey::from_bytes([9u8; KEY_SIZE]);
        let a = StateKeys::derive(&master).unwrap();
        let b = StateKeys::derive(&master).unwrap();
        assert_eq!(a.enc, b.enc);
        assert_eq!(a.mac, b.mac);
    }

    #[test]
    fn test_debug_redacts() {
        let master = MasterKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{master:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
