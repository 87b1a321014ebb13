//! Proof-of-storage engine: encode, challenge, prove, verify
//!
//! A file is split into chunks of `sectors` sectors, each sector being
//! `sector_size = floor(bits(p) / 8)` bytes so its integer value is below `p`.
//! The last chunk may be short; a file whose length is an exact multiple of
//! the chunk size still ends with one empty chunk, so a tag always carries
//! `floor(len / chunk_bytes) + 1` elements.

use std::io::{self, Read, Seek, SeekFrom};

use hb_core::config::EngineConfig;
use hb_core::{HbError, HbResult};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::codec::FieldCodec;
use crate::field::{from_be, generate_prime, is_probable_prime, sector_size};
use crate::keys::{MasterKey, SeedKey};
use crate::prf::KeyedPrf;
use crate::state::{PlainState, State};
use crate::types::{Challenge, Proof, Tag};

#[derive(Clone, Debug)]
pub struct Engine {
    prime: BigUint,
    sectors: usize,
    sector_size: usize,
    master_key: Option<MasterKey>,
}

impl Engine {
    /// Build a client engine.
    ///
    /// A fresh master key is drawn when none is given, and a fresh prime of
    /// `prime_bits` bits when `prime` is `None`.
    pub fn new<R: RngCore + CryptoRng>(
        sectors: usize,
        master_key: Option<MasterKey>,
        prime: Option<BigUint>,
        prime_bits: usize,
        rng: &mut R,
    ) -> HbResult<Self> {
        if sectors == 0 {
            return Err(HbError::Config("sectors must be at least 1".into()));
        }
        let prime = match prime {
            Some(p) => {
                if p <= BigUint::one() {
                    return Err(HbError::Config("prime must be greater than 1".into()));
                }
                if !is_probable_prime(&p) {
                    return Err(HbError::Config("supplied modulus is not prime".into()));
                }
                p
            }
            None => generate_prime(prime_bits, rng)?,
        };
        let sector_size = sector_size(&prime);
        if sector_size == 0 {
            return Err(HbError::Config(
                "prime too small: sectors would hold zero bytes".into(),
            ));
        }
        let master_key = master_key.unwrap_or_else(|| MasterKey::generate(rng));

        debug!(
            sectors,
            sector_size,
            prime_bits = prime.bits(),
            "proof-of-storage engine ready"
        );
        Ok(Self {
            prime,
            sectors,
            sector_size,
            master_key: Some(master_key),
        })
    }

    pub fn from_config<R: RngCore + CryptoRng>(
        config: &EngineConfig,
        master_key: Option<MasterKey>,
        rng: &mut R,
    ) -> HbResult<Self> {
        let prime = config.prime_bytes()?.map(|b| from_be(&b));
        Self::new(config.sectors, master_key, prime, config.prime_bits, rng)
    }

    /// Same field and sector layout, without the master key.
    ///
    /// This is all a storage node needs to run [`Engine::prove`].
    pub fn public_view(&self) -> Self {
        Self {
            prime: self.prime.clone(),
            sectors: self.sectors,
            sector_size: self.sector_size,
            master_key: None,
        }
    }

    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    pub fn sectors(&self) -> usize {
        self.sectors
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn chunk_size(&self) -> usize {
        self.sectors * self.sector_size
    }

    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    pub fn codec(&self) -> FieldCodec {
        FieldCodec::new(&self.prime)
    }

    fn master_key(&self) -> HbResult<&MasterKey> {
        self.master_key
            .as_ref()
            .ok_or_else(|| HbError::Config("public engine has no master key".into()))
    }

    /// Tag a file. Returns the tag and the sealed state.
    pub fn encode<F: Read, R: RngCore + CryptoRng>(
        &self,
        file: F,
        rng: &mut R,
    ) -> HbResult<(Tag, State)> {
        let master = self.master_key()?;
        let mut file = io::BufReader::new(file);

        let f_key = SeedKey::generate(rng);
        let alpha_key = SeedKey::generate(rng);
        let f = KeyedPrf::new(&f_key, self.prime.clone())?;
        let alpha = KeyedPrf::new(&alpha_key, self.prime.clone())?;
        let alphas = (0..self.sectors as u64)
            .map(|j| alpha.eval(j))
            .collect::<HbResult<Vec<_>>>()?;

        let mut sigma = Vec::new();
        let mut buf = vec![0u8; self.sector_size];
        let mut bytes = 0u64;
        let mut done = false;
        while !done {
            let mut value = f.eval(sigma.len() as u64)?;
            for alpha_j in &alphas {
                let n = read_up_to(&mut file, &mut buf)?;
                if n > 0 {
                    value += alpha_j * from_be(&buf[..n]);
                    bytes += n as u64;
                }
                if n < self.sector_size {
                    done = true;
                    break;
                }
            }
            sigma.push(value % &self.prime);
        }

        let chunks = sigma.len() as u64;
        let state = State::Plain(PlainState::new(f_key, alpha_key, chunks)).encrypt(master, rng)?;
        debug!(chunks, bytes, "file encoded");
        Ok((Tag::new(sigma), state))
    }

    /// Default challenge: one sample per chunk, coefficients below `p`.
    pub fn gen_challenge<R: RngCore + CryptoRng>(
        &self,
        state: &State,
        rng: &mut R,
    ) -> HbResult<Challenge> {
        self.gen_challenge_with(state, state.chunk_count(), self.prime.clone(), rng)
    }

    /// Challenge with a chosen sample count and coefficient bound.
    ///
    /// The state is authenticated first; a tampered state fails here.
    pub fn gen_challenge_with<R: RngCore + CryptoRng>(
        &self,
        state: &State,
        chunk_count: u64,
        v_max: BigUint,
        rng: &mut R,
    ) -> HbResult<Challenge> {
        let plain = state.open(self.master_key()?)?;
        if chunk_count == 0 {
            return Err(HbError::Config("challenge must sample at least one chunk".into()));
        }
        if v_max.is_zero() || v_max > self.prime {
            return Err(HbError::Config("v_max must lie in 1..=p".into()));
        }
        debug!(
            samples = chunk_count,
            chunks = plain.chunk_count(),
            "challenge issued"
        );
        Ok(Challenge::new(chunk_count, v_max, SeedKey::generate(rng)))
    }

    /// Answer a challenge. Runs on the storage node; needs no master key.
    pub fn prove<F: Read + Seek>(
        &self,
        mut file: F,
        chal: &Challenge,
        tag: &Tag,
    ) -> HbResult<Proof> {
        if chal.chunk_count == 0 {
            return Err(HbError::Config("challenge must sample at least one chunk".into()));
        }
        let file_len = file.seek(SeekFrom::End(0))?;
        let chunk_bytes = self.chunk_size() as u64;
        let expected = file_len / chunk_bytes + 1;
        if tag.len() as u64 != expected {
            return Err(HbError::Config(format!(
                "tag has {} elements but a {file_len}-byte file with {} sectors/chunk has {expected} chunks",
                tag.len(),
                self.sectors
            )));
        }

        let index = KeyedPrf::new(&chal.key, BigUint::from(tag.len()))?;
        let v = KeyedPrf::new(&chal.key, chal.v_max.clone())?;

        let mut mu = vec![BigUint::zero(); self.sectors];
        let mut sigma = BigUint::zero();
        let mut buf = vec![0u8; self.sector_size];
        for i in 0..chal.chunk_count {
            let c = index.eval_index(i)?;
            let coeff = v.eval(i)?;

            let start = c * chunk_bytes;
            if start < file_len {
                file.seek(SeekFrom::Start(start))?;
                for (j, mu_j) in mu.iter_mut().enumerate() {
                    if start + (j * self.sector_size) as u64 >= file_len {
                        break;
                    }
                    let n = read_up_to(&mut file, &mut buf)?;
                    *mu_j += &coeff * from_be(&buf[..n]);
                    *mu_j %= &self.prime;
                }
            }

            sigma += &coeff * &tag.sigma()[c as usize];
            sigma %= &self.prime;
        }

        debug!(samples = chal.chunk_count, chunks = tag.len(), "proof computed");
        Ok(Proof { mu, sigma })
    }

    /// Check a proof against the challenge that produced it.
    ///
    /// `Ok(false)` means the node failed to prove possession. An
    /// unauthenticated state is an error, not a failed proof.
    pub fn verify(&self, proof: &Proof, chal: &Challenge, state: &State) -> HbResult<bool> {
        let plain = state.open(self.master_key()?)?;
        if chal.chunk_count == 0 {
            return Err(HbError::Config("challenge must sample at least one chunk".into()));
        }
        if proof.mu.len() != self.sectors {
            warn!(
                expected = self.sectors,
                got = proof.mu.len(),
                "proof has wrong sector count"
            );
            return Ok(false);
        }

        let index = KeyedPrf::new(&chal.key, BigUint::from(plain.chunk_count()))?;
        let v = KeyedPrf::new(&chal.key, chal.v_max.clone())?;
        let f = KeyedPrf::new(plain.f_key(), self.prime.clone())?;
        let alpha = KeyedPrf::new(plain.alpha_key(), self.prime.clone())?;

        let mut rhs = BigUint::zero();
        for i in 0..chal.chunk_count {
            rhs += v.eval(i)? * f.eval(index.eval_index(i)?)?;
            rhs %= &self.prime;
        }
        for (j, mu_j) in proof.mu.iter().enumerate() {
            rhs += alpha.eval(j as u64)? * mu_j;
        }
        rhs %= &self.prime;

        let ok = proof.sigma == rhs;
        if ok {
            debug!(samples = chal.chunk_count, "proof verified");
        } else {
            warn!(samples = chal.chunk_count, "proof rejected");
        }
        Ok(ok)
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
