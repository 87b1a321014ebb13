//! Records exchanged between client and storage node

use hb_core::{HbError, HbResult};
use num_bigint::BigUint;

use crate::keys::SeedKey;
use crate::state::State;

/// Per-chunk homomorphic authenticators, produced once by `encode`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tag {
    sigma: Vec<BigUint>,
}

impl Tag {
    pub fn new(sigma: Vec<BigUint>) -> Self {
        Self { sigma }
    }

    pub fn sigma(&self) -> &[BigUint] {
        &self.sigma
    }

    pub fn len(&self) -> usize {
        self.sigma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigma.is_empty()
    }

    /// Check that this tag pairs with `state` (sealed or not).
    pub fn ensure_matches(&self, state: &State) -> HbResult<()> {
        if self.sigma.len() as u64 != state.chunk_count() {
            return Err(HbError::Config(format!(
                "tag has {} elements but state covers {} chunks",
                self.sigma.len(),
                state.chunk_count()
            )));
        }
        Ok(())
    }
}

/// One verification round. The key must never be reused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    /// Number of (possibly repeating) chunk samples
    pub chunk_count: u64,
    /// Exclusive bound on the random coefficients
    pub v_max: BigUint,
    pub key: SeedKey,
}

impl Challenge {
    pub fn new(chunk_count: u64, v_max: BigUint, key: SeedKey) -> Self {
        Self {
            chunk_count,
            v_max,
            key,
        }
    }
}

/// Storage node's response: one partial combination per sector plus the
/// aggregated authenticator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub mu: Vec<BigUint>,
    pub sigma: BigUint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::MasterKey;
    use crate::state::PlainState;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_tag_matches_state() {
        let tag = Tag::new(vec![BigUint::from(1u8); 3]);
        let state = State::Plain(PlainState::new(
            SeedKey::from_bytes([1; 32]),
            SeedKey::from_bytes([2; 32]),
            3,
        ));
        tag.ensure_matches(&state).unwrap();

        // chunk count is visible on the sealed form as well
        let mut rng = StdRng::seed_from_u64(0);
        let sealed = state
            .encrypt(&MasterKey::from_bytes([3; 32]), &mut rng)
            .unwrap();
        tag.ensure_matches(&sealed).unwrap();
    }

    #[test]
    fn test_tag_length_mismatch() {
        let tag = Tag::new(vec![BigUint::from(1u8); 2]);
        let state = State::Plain(PlainState::new(
            SeedKey::from_bytes([1; 32]),
            SeedKey::from_bytes([2; 32]),
            3,
        ));
        assert!(tag.ensure_matches(&state).unwrap_err().is_config());
    }
}
