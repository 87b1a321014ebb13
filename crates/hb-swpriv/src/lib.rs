//! hb-swpriv: privately verifiable proof of storage
//!
//! A client tags a file once, keeps a small secret state, and later checks
//! that a remote node still holds the file without downloading it.
//!
//! ```text
//! client                                  storage node
//!   encode(file) ──► (tag, state_enc) ────► stores file + tag (+ state_enc)
//!   gen_challenge(state_enc) ─► challenge ─► prove(file, challenge, tag)
//!   verify(proof, challenge, state) ◄──────── proof
//! ```
//!
//! Per chunk `c` the tag holds `sigma_c = f(c) + Σ_j alpha(j)·m[c][j] (mod p)`,
//! where `f` and `alpha` are keyed PRFs whose seeds live only in the state.
//! The state is sealed with AES-256-CTR and authenticated with HMAC-SHA256
//! under subkeys derived from the client's master key.

pub mod codec;
pub mod engine;
pub mod field;
pub mod keys;
pub mod prf;
pub mod state;
pub mod types;

pub use codec::FieldCodec;
pub use engine::Engine;
pub use keys::{MasterKey, SeedKey};
pub use prf::KeyedPrf;
pub use state::{EncryptedState, PlainState, State};
pub use types::{Challenge, Proof, Tag};

/// Size of master keys, PRF seeds and challenge keys (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the state encryption IV (one AES block)
pub const IV_SIZE: usize = 16;

/// Size of the HMAC-SHA256 state authenticator
pub const MAC_SIZE: usize = 32;

/// Upper bound on rejection-sampling rounds in a single PRF evaluation
pub const PRF_MAX_ATTEMPTS: u32 = 1000;
