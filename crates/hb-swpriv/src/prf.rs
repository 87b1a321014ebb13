//! Range-restricted keyed pseudorandom function
//!
//! `eval(x)` hashes the decimal form of `x + nonce` with SHA-256, pads or
//! truncates the digest to the byte length of `range`, encrypts it with
//! AES-256-CFB under the PRF key and an all-zero IV, masks the result to the
//! bit length of `range` and accepts it if it is below `range`. Rejected
//! draws bump the nonce. Each round accepts with probability above 1/2, so
//! the [`PRF_MAX_ATTEMPTS`] cap is never reached in practice.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use hb_core::{HbError, HbResult};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use sha2::{Digest, Sha256};

use crate::field::{bit_length, from_be};
use crate::keys::SeedKey;
use crate::{IV_SIZE, PRF_MAX_ATTEMPTS};

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;

#[derive(Clone, Debug)]
pub struct KeyedPrf {
    key: SeedKey,
    range: BigUint,
    byte_len: usize,
    mask: BigUint,
}

impl KeyedPrf {
    /// Build a PRF with outputs in `[0, range)`. A zero range is rejected.
    pub fn new(key: &SeedKey, range: BigUint) -> HbResult<Self> {
        if range.is_zero() {
            return Err(HbError::Config("PRF range must be non-zero".into()));
        }
        let bits = bit_length(&range);
        Ok(Self {
            key: key.clone(),
            byte_len: bits.div_ceil(8),
            mask: (BigUint::one() << bits) - 1u8,
            range,
        })
    }

    pub fn range(&self) -> &BigUint {
        &self.range
    }

    pub fn eval(&self, x: u64) -> HbResult<BigUint> {
        let iv = [0u8; IV_SIZE];
        for nonce in 0..PRF_MAX_ATTEMPTS {
            let input = (u128::from(x) + u128::from(nonce)).to_string();
            let mut block = pad(&Sha256::digest(input.as_bytes()), self.byte_len);
            Aes256CfbEnc::new(self.key.as_bytes().into(), (&iv).into()).encrypt(&mut block);

            let candidate = from_be(&block) & &self.mask;
            if candidate < self.range {
                return Ok(candidate);
            }
        }
        Err(HbError::Config(format!(
            "PRF rejection sampling exceeded {PRF_MAX_ATTEMPTS} attempts"
        )))
    }

    /// Evaluate and narrow to an index; for PRFs whose range fits in `u64`.
    pub fn eval_index(&self, x: u64) -> HbResult<u64> {
        let value = self.eval(x)?;
        u64::try_from(&value)
            .map_err(|_| HbError::Config("PRF output does not fit an index".into()))
    }
}

/// Truncate or zero-pad `data` to exactly `len` bytes.
fn pad(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let take = data.len().min(len);
    out[..take].copy_from_slice(&data[..take]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(b: u8) -> SeedKey {
        SeedKey::from_bytes([b; 32])
    }

    #[test]
    fn test_zero_range_rejected() {
        let err = KeyedPrf::new(&key(1), BigUint::zero()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_range_one_always_zero() {
        let prf = KeyedPrf::new(&key(1), BigUint::one()).unwrap();
        for x in 0..32 {
            assert!(prf.eval(x).unwrap().is_zero());
        }
    }

    #[test]
    fn test_deterministic_across_instances() {
        let range = BigUint::from(1_000_003u32);
        let a = KeyedPrf::new(&key(3), range.clone()).unwrap();
        let b = KeyedPrf::new(&key(3), range).unwrap();
        for x in 0..64 {
            assert_eq!(a.eval(x).unwrap(), a.eval(x).unwrap());
            assert_eq!(a.eval(x).unwrap(), b.eval(x).unwrap());
        }
    }

    #[test]
    fn test_different_keys_differ() {
        let range: BigUint = BigUint::one() << 200;
        let a = KeyedPrf::new(&key(1), range.clone()).unwrap();
        let b = KeyedPrf::new(&key(2), range).unwrap();
        let same = (0..32)
            .filter(|&x| a.eval(x).unwrap() == b.eval(x).unwrap())
            .count();
        assert_eq!(same, 0, "independent keys must give unrelated outputs");
    }

    #[test]
    fn test_large_range_uses_full_width() {
        // 1024-bit range: digest is zero-padded to 128 bytes before encryption
        let range: BigUint = (BigUint::one() << 1023) + 12345u32;
        let prf = KeyedPrf::new(&key(5), range.clone()).unwrap();
        let v = prf.eval(0).unwrap();
        assert!(v < range);
        assert!(bit_length(&v) > 900, "high bits should be populated");
    }

    #[test]
    fn test_eval_index() {
        let prf = KeyedPrf::new(&key(8), BigUint::from(17u32)).unwrap();
        for x in 0..100 {
            assert!(prf.eval_index(x).unwrap() < 17);
        }
    }

    #[test]
    fn test_pad_truncates_and_extends() {
        assert_eq!(pad(&[1, 2, 3], 2), vec![1, 2]);
        assert_eq!(pad(&[1, 2], 4), vec![1, 2, 0, 0]);
    }

    proptest! {
        #[test]
        fn prop_output_in_range(seed in any::<[u8; 32]>(), range in 1u64.., x in any::<u64>()) {
            let prf = KeyedPrf::new(&SeedKey::from_bytes(seed), BigUint::from(range)).unwrap();
            let v = prf.eval(x).unwrap();
            prop_assert!(v < BigUint::from(range));
            prop_assert_eq!(v, prf.eval(x).unwrap());
        }
    }
}
