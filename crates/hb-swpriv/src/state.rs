//! Secret state: the two PRF seeds and the chunk count of a tagged file
//!
//! A [`State`] is either plaintext (client only) or sealed. Sealing encrypts
//! both seeds with AES-256-CTR under a fresh random IV and authenticates
//! `iv || chunk_count || f_key_ct || alpha_key_ct` with HMAC-SHA256. Both
//! subkeys are derived from the client's [`MasterKey`].
//!
//! Sealed wire format (binary, 120 bytes):
//! ```text
//! [8 bytes: chunk_count BE][16 bytes: iv][32 bytes: f_key ct][32 bytes: alpha_key ct][32 bytes: mac]
//! ```

use ctr::cipher::{KeyIvInit, StreamCipher};
use hb_core::{HbError, HbResult};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::keys::{MasterKey, SeedKey, StateKeys};
use crate::{IV_SIZE, KEY_SIZE, MAC_SIZE};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Length of a serialized [`EncryptedState`].
pub const ENCRYPTED_STATE_LEN: usize = 8 + IV_SIZE + 2 * KEY_SIZE + MAC_SIZE;

/// Decrypted state. Holds the keys that determine every tag value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainState {
    f_key: SeedKey,
    alpha_key: SeedKey,
    chunk_count: u64,
}

impl PlainState {
    pub fn new(f_key: SeedKey, alpha_key: SeedKey, chunk_count: u64) -> Self {
        Self {
            f_key,
            alpha_key,
            chunk_count,
        }
    }

    pub fn f_key(&self) -> &SeedKey {
        &self.f_key
    }

    pub fn alpha_key(&self) -> &SeedKey {
        &self.alpha_key
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }
}

/// Sealed state, safe to hand to an untrusted storage node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedState {
    chunk_count: u64,
    iv: [u8; IV_SIZE],
    f_key_ct: [u8; KEY_SIZE],
    alpha_key_ct: [u8; KEY_SIZE],
    mac: [u8; MAC_SIZE],
}

impl EncryptedState {
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCRYPTED_STATE_LEN);
        out.extend_from_slice(&self.chunk_count.to_be_bytes());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.f_key_ct);
        out.extend_from_slice(&self.alpha_key_ct);
        out.extend_from_slice(&self.mac);
        out
    }

    /// Parse a sealed state. Authenticity is only checked on decrypt.
    pub fn from_bytes(data: &[u8]) -> HbResult<Self> {
        if data.len() != ENCRYPTED_STATE_LEN {
            return Err(HbError::Codec(format!(
                "encrypted state must be {ENCRYPTED_STATE_LEN} bytes, got {}",
                data.len()
            )));
        }
        let (count, rest) = data.split_at(8);
        let (iv, rest) = rest.split_at(IV_SIZE);
        let (f_ct, rest) = rest.split_at(KEY_SIZE);
        let (alpha_ct, mac) = rest.split_at(KEY_SIZE);

        let mut state = Self {
            chunk_count: 0,
            iv: [0u8; IV_SIZE],
            f_key_ct: [0u8; KEY_SIZE],
            alpha_key_ct: [0u8; KEY_SIZE],
            mac: [0u8; MAC_SIZE],
        };
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(count);
        state.chunk_count = u64::from_be_bytes(count_bytes);
        state.iv.copy_from_slice(iv);
        state.f_key_ct.copy_from_slice(f_ct);
        state.alpha_key_ct.copy_from_slice(alpha_ct);
        state.mac.copy_from_slice(mac);
        Ok(state)
    }

    fn mac_input(&self, mac: &mut HmacSha256) {
        mac.update(&self.iv);
        mac.update(&self.chunk_count.to_be_bytes());
        mac.update(&self.f_key_ct);
        mac.update(&self.alpha_key_ct);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    Plain(PlainState),
    Encrypted(EncryptedState),
}

impl State {
    /// Number of chunks in the tagged file. Readable without the master key.
    pub fn chunk_count(&self) -> u64 {
        match self {
            State::Plain(s) => s.chunk_count,
            State::Encrypted(s) => s.chunk_count,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, State::Encrypted(_))
    }

    /// Seal the state. An already sealed state is returned unchanged.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        master: &MasterKey,
        rng: &mut R,
    ) -> HbResult<State> {
        let plain = match self {
            State::Encrypted(_) => return Ok(self.clone()),
            State::Plain(p) => p,
        };
        let keys = StateKeys::derive(master)?;

        let mut iv = [0u8; IV_SIZE];
        rng.fill_bytes(&mut iv);

        let mut buf = [0u8; 2 * KEY_SIZE];
        buf[..KEY_SIZE].copy_from_slice(plain.f_key.as_bytes());
        buf[KEY_SIZE..].copy_from_slice(plain.alpha_key.as_bytes());
        Aes256Ctr::new((&keys.enc).into(), (&iv).into()).apply_keystream(&mut buf);

        let mut sealed = EncryptedState {
            chunk_count: plain.chunk_count,
            iv,
            f_key_ct: [0u8; KEY_SIZE],
            alpha_key_ct: [0u8; KEY_SIZE],
            mac: [0u8; MAC_SIZE],
        };
        sealed.f_key_ct.copy_from_slice(&buf[..KEY_SIZE]);
        sealed.alpha_key_ct.copy_from_slice(&buf[KEY_SIZE..]);

        let mut mac = new_mac(&keys)?;
        sealed.mac_input(&mut mac);
        sealed.mac.copy_from_slice(&mac.finalize().into_bytes());

        Ok(State::Encrypted(sealed))
    }

    /// Authenticate and unseal. A plaintext state is returned unchanged.
    ///
    /// On MAC mismatch nothing is decrypted and `Authentication` is returned.
    pub fn decrypt(&self, master: &MasterKey) -> HbResult<State> {
        let sealed = match self {
            State::Plain(_) => return Ok(self.clone()),
            State::Encrypted(s) => s,
        };
        let keys = StateKeys::derive(master)?;

        let mut mac = new_mac(&keys)?;
        sealed.mac_input(&mut mac);
        if mac.verify_slice(&sealed.mac).is_err() {
            tracing::warn!(chunks = sealed.chunk_count, "state MAC mismatch");
            return Err(HbError::Authentication(
                "state signature invalid: wrong key or tampered state".into(),
            ));
        }

        let mut buf = [0u8; 2 * KEY_SIZE];
        buf[..KEY_SIZE].copy_from_slice(&sealed.f_key_ct);
        buf[KEY_SIZE..].copy_from_slice(&sealed.alpha_key_ct);
        Aes256Ctr::new((&keys.enc).into(), (&sealed.iv).into()).apply_keystream(&mut buf);

        let mut f_key = [0u8; KEY_SIZE];
        let mut alpha_key = [0u8; KEY_SIZE];
        f_key.copy_from_slice(&buf[..KEY_SIZE]);
        alpha_key.copy_from_slice(&buf[KEY_SIZE..]);
        buf.zeroize();

        Ok(State::Plain(PlainState::new(
            SeedKey::from_bytes(f_key),
            SeedKey::from_bytes(alpha_key),
            sealed.chunk_count,
        )))
    }

    /// Decrypt if needed and return the plaintext view.
    pub fn open(&self, master: &MasterKey) -> HbResult<PlainState> {
        match self.decrypt(master)? {
            State::Plain(p) => Ok(p),
            State::Encrypted(_) => Err(HbError::Authentication(
                "state remained sealed after decrypt".into(),
            )),
        }
    }

    pub fn as_encrypted(&self) -> Option<&EncryptedState> {
        match self {
            State::Encrypted(s) => Some(s),
            State::Plain(_) => None,
        }
    }
}

impl From<EncryptedState> for State {
    fn from(s: EncryptedState) -> Self {
        State::Encrypted(s)
    }
}

fn new_mac(keys: &StateKeys) -> HbResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(&keys.mac)
        .map_err(|e| HbError::Other(anyhow::anyhow!("HMAC key setup failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn master() -> MasterKey {
        MasterKey::from_bytes([42u8; KEY_SIZE])
    }

    fn plain(chunks: u64) -> State {
        State::Plain(PlainState::new(
            SeedKey::from_bytes([1u8; KEY_SIZE]),
            SeedKey::from_bytes([2u8; KEY_SIZE]),
            chunks,
        ))
    }

    fn sealed(chunks: u64) -> EncryptedState {
        let mut rng = StdRng::seed_from_u64(11);
        plain(chunks)
            .encrypt(&master(), &mut rng)
            .unwrap()
            .as_encrypted()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let mut rng = StdRng::seed_from_u64(1);
        let original = plain(40);

        let enc = original.encrypt(&master(), &mut rng).unwrap();
        assert!(enc.is_encrypted());
        assert_eq!(enc.chunk_count(), 40);

        let dec = enc.decrypt(&master()).unwrap();
        assert_eq!(dec, original);
    }

    #[test]
    fn test_ciphertext_hides_keys() {
        let enc = sealed(3);
        assert_ne!(&enc.f_key_ct, &[1u8; KEY_SIZE]);
        assert_ne!(&enc.alpha_key_ct, &[2u8; KEY_SIZE]);
    }

    #[test]
    fn test_encrypt_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(2);
        let once = plain(5).encrypt(&master(), &mut rng).unwrap();
        let twice = once.encrypt(&master(), &mut rng).unwrap();
        assert_eq!(once, twice, "second encrypt must not re-randomize the IV");
    }

    #[test]
    fn test_decrypt_plain_is_noop() {
        let original = plain(5);
        assert_eq!(original.decrypt(&master()).unwrap(), original);
    }

    #[test]
    fn test_fresh_iv_per_encrypt() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = plain(5).encrypt(&master(), &mut rng).unwrap();
        let b = plain(5).encrypt(&master(), &mut rng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_master_key() {
        let enc = State::Encrypted(sealed(9));
        let other = MasterKey::from_bytes([7u8; KEY_SIZE]);
        let err = enc.decrypt(&other).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_tampered_chunk_count() {
        let mut enc = sealed(9);
        enc.chunk_count = 3;
        let err = State::Encrypted(enc).decrypt(&master()).unwrap_err();
        assert!(err.is_authentication(), "shrinking chunk_count must be detected");
    }

    #[test]
    fn test_failed_decrypt_leaves_state_intact() {
        let mut enc = sealed(9);
        enc.iv[0] ^= 0x01;
        let state = State::Encrypted(enc.clone());
        assert!(state.decrypt(&master()).is_err());
        assert_eq!(state, State::Encrypted(enc));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let enc = sealed(77);
        let bytes = enc.to_bytes();
        assert_eq!(bytes.len(), ENCRYPTED_STATE_LEN);
        assert_eq!(EncryptedState::from_bytes(&bytes).unwrap(), enc);
    }

    #[test]
    fn test_from_bytes_wrong_length() {
        assert!(EncryptedState::from_bytes(&[0u8; 10]).is_err());
        assert!(EncryptedState::from_bytes(&[0u8; ENCRYPTED_STATE_LEN + 1]).is_err());
    }

    proptest! {
        #[test]
        fn prop_any_byte_flip_detected(idx in 0..ENCRYPTED_STATE_LEN, bit in 0u8..8) {
            let mut bytes = sealed(123).to_bytes();
            bytes[idx] ^= 1 << bit;
            let tampered = EncryptedState::from_bytes(&bytes).unwrap();
            let err = State::Encrypted(tampered).decrypt(&master()).unwrap_err();
            prop_assert!(err.is_authentication());
        }

        #[test]
        fn prop_roundtrip(f in any::<[u8; 32]>(), a in any::<[u8; 32]>(), n in any::<u64>(), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let original = State::Plain(PlainState::new(SeedKey::from_bytes(f), SeedKey::from_bytes(a), n));
            let restored = original.encrypt(&master(), &mut rng).unwrap().decrypt(&master()).unwrap();
            prop_assert_eq!(restored, original);
        }
    }
}
