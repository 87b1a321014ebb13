//! Prime-field helpers: byte/element conversion and prime generation

use hb_core::{HbError, HbResult};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

/// Smallest prime bit length the engine accepts.
pub const MIN_PRIME_BITS: usize = 16;

const MILLER_RABIN_ROUNDS: usize = 32;

/// Number of bits needed to represent `n` (0 for zero).
pub fn bit_length(n: &BigUint) -> usize {
    n.bits() as usize
}

/// Minimal byte length covering `n`.
pub fn byte_length(n: &BigUint) -> usize {
    bit_length(n).div_ceil(8)
}

/// Largest byte count whose integer value is always strictly below `p`.
pub fn sector_size(p: &BigUint) -> usize {
    bit_length(p) / 8
}

/// Interpret a big-endian byte buffer as a field integer.
pub fn from_be(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// Encode `n` as exactly `width` big-endian bytes, left-padded with zeros.
pub fn to_fixed_be(n: &BigUint, width: usize) -> HbResult<Vec<u8>> {
    let bytes = if n.is_zero() {
        Vec::new()
    } else {
        n.to_bytes_be()
    };
    if bytes.len() > width {
        return Err(HbError::Codec(format!(
            "integer of {} bytes does not fit in {width}-byte field",
            bytes.len()
        )));
    }
    let mut out = vec![0u8; width];
    out[width - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// Generate a random prime of exactly `bits` bits.
pub fn generate_prime<R: RngCore + CryptoRng>(bits: usize, rng: &mut R) -> HbResult<BigUint> {
    if bits < MIN_PRIME_BITS {
        return Err(HbError::Config(format!(
            "prime_bits must be at least {MIN_PRIME_BITS}, got {bits}"
        )));
    }

    let len = bits.div_ceil(8);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);

    // Clear the excess high bits, then pin the top bit and make it odd.
    let excess = len * 8 - bits;
    buf[0] &= 0xff >> excess;
    buf[0] |= 0x80 >> excess;
    buf[len - 1] |= 0x01;

    let mut candidate = BigUint::from_bytes_be(&buf);
    loop {
        if is_probable_prime(&candidate) {
            return Ok(candidate);
        }
        candidate += 2u8;
        if bit_length(&candidate) > bits {
            // Wrapped past the top of the range; start over from a fresh draw.
            rng.fill_bytes(&mut buf);
            buf[0] &= 0xff >> excess;
            buf[0] |= 0x80 >> excess;
            buf[len - 1] |= 0x01;
            candidate = BigUint::from_bytes_be(&buf);
        }
    }
}

/// Trial division followed by Miller–Rabin.
pub fn is_probable_prime(n: &BigUint) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u8);
    let three = BigUint::from(3u8);

    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if (n & &one).is_zero() {
        return false;
    }

    const SMALL_PRIMES: &[u32] = &[
        3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    ];
    for &p in SMALL_PRIMES {
        if n == &BigUint::from(p) {
            return true;
        }
        if (n % p).is_zero() {
            return false;
        }
    }

    miller_rabin(n, MILLER_RABIN_ROUNDS)
}

fn miller_rabin(n: &BigUint, rounds: usize) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u8);

    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while (&d & &one).is_zero() {
        d >>= 1;
        s += 1;
    }

    // Witnesses are derived from n so the test is reproducible.
    let n_bytes = n.to_bytes_be();
    for i in 0..rounds {
        let mut h = Sha256::new();
        h.update(&n_bytes);
        h.update((i as u32).to_be_bytes());
        let mut a = BigUint::from_bytes_be(&h.finalize());
        if a >= n_minus_one {
            a %= &n_minus_one;
        }
        if a < two {
            a += &two;
        }

        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }

        let mut composite = true;
        for _ in 0..s.saturating_sub(1) {
            x = (&x * &x) % n;
            if x == n_minus_one {
                composite = false;
                break;
            }
            if x == one {
                return false;
            }
        }
        if composite {
            return false;
        }
    }

    true
}
