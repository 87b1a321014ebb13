//! Fixed-width big-endian encoding of tags, challenges and proofs
//!
//! Every field element is written as exactly `width` bytes, where `width` is
//! the minimal byte length covering the prime. Counts are big-endian.
//!
//! ```text
//! Tag:       [4: count][count × width: sigma_i]
//! Proof:     [4: sectors][sectors × width: mu_j][width: sigma]
//! Challenge: [8: chunk_count][32: key][width: v_max]
//! ```
//!
//! Sealed states have their own fixed layout, see [`crate::EncryptedState`].

use hb_core::{HbError, HbResult};
use num_bigint::BigUint;

use crate::field::{byte_length, from_be, to_fixed_be};
use crate::keys::SeedKey;
use crate::types::{Challenge, Proof, Tag};
use crate::KEY_SIZE;

#[derive(Clone, Debug)]
pub struct FieldCodec {
    prime: BigUint,
    width: usize,
}

impl FieldCodec {
    pub fn new(prime: &BigUint) -> Self {
        Self {
            width: byte_length(prime),
            prime: prime.clone(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn encode_tag(&self, tag: &Tag) -> HbResult<Vec<u8>> {
        let count = u32::try_from(tag.len())
            .map_err(|_| HbError::Codec("tag too long to encode".into()))?;
        let mut out = Vec::with_capacity(4 + tag.len() * self.width);
        out.extend_from_slice(&count.to_be_bytes());
        for sigma in tag.sigma() {
            out.extend(to_fixed_be(sigma, self.width)?);
        }
        Ok(out)
    }

    pub fn decode_tag(&self, data: &[u8]) -> HbResult<Tag> {
        let mut reader = Reader::new(data);
        let count = reader.u32()? as usize;
        let mut sigma = Vec::with_capacity(count.min(data.len() / self.width.max(1)));
        for _ in 0..count {
            sigma.push(self.element(&mut reader)?);
        }
        reader.finish()?;
        Ok(Tag::new(sigma))
    }

    pub fn encode_proof(&self, proof: &Proof) -> HbResult<Vec<u8>> {
        let count = u32::try_from(proof.mu.len())
            .map_err(|_| HbError::Codec("proof too long to encode".into()))?;
        let mut out = Vec::with_capacity(4 + (proof.mu.len() + 1) * self.width);
        out.extend_from_slice(&count.to_be_bytes());
        for mu in &proof.mu {
            out.extend(to_fixed_be(mu, self.width)?);
        }
        out.extend(to_fixed_be(&proof.sigma, self.width)?);
        Ok(out)
    }

    pub fn decode_proof(&self, data: &[u8]) -> HbResult<Proof> {
        let mut reader = Reader::new(data);
        let count = reader.u32()? as usize;
        let mut mu = Vec::with_capacity(count.min(data.len() / self.width.max(1)));
        for _ in 0..count {
            mu.push(self.element(&mut reader)?);
        }
        let sigma = self.element(&mut reader)?;
        reader.finish()?;
        Ok(Proof { mu, sigma })
    }

    pub fn encode_challenge(&self, chal: &Challenge) -> HbResult<Vec<u8>> {
        let mut out = Vec::with_capacity(8 + KEY_SIZE + self.width);
        out.extend_from_slice(&chal.chunk_count.to_be_bytes());
        out.extend_from_slice(chal.key.as_bytes());
        out.extend(to_fixed_be(&chal.v_max, self.width)?);
        Ok(out)
    }

    pub fn decode_challenge(&self, data: &[u8]) -> HbResult<Challenge> {
        let mut reader = Reader::new(data);
        let chunk_count = reader.u64()?;
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(reader.take(KEY_SIZE)?);
        // v_max may equal the prime itself, so it is not range-checked here.
        let v_max = from_be(reader.take(self.width)?);
        reader.finish()?;
        Ok(Challenge::new(chunk_count, v_max, SeedKey::from_bytes(key)))
    }

    fn element(&self, reader: &mut Reader<'_>) -> HbResult<BigUint> {
        let value = from_be(reader.take(self.width)?);
        if value >= self.prime {
            return Err(HbError::Codec("field element not below the prime".into()));
        }
        Ok(value)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> HbResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                HbError::Codec(format!(
                    "truncated input: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> HbResult<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self) -> HbResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn finish(self) -> HbResult<()> {
        if self.pos != self.data.len() {
            return Err(HbError::Codec(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}
