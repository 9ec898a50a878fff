//! The homomorphic encryption substrate consumed by the packing and distance
//! layers.
//!
//! The protocols only need a SIMD-batched, exact-integer scheme (BFV-like):
//! slots are elements of `Z_t`, ciphertexts can be added, multiplied by
//! ciphertexts, plaintexts or scalars, and summed along a stride with
//! rotations. [`HeEvaluator`] is what a party holding only public and
//! evaluation keys can do; [`HeDecryptor`] adds decryption for the key
//! owner.
use thiserror::Error;

pub mod bfv;
pub mod clear;

pub use bfv::{FheBfv, FheBfvCiphertext, FheBfvParams, FheBfvPublicKey, FheBfvSecretKey};
pub use clear::{
    ClearBfv, ClearBfvParams, ClearCiphertext, ClearPlaintext, ClearPublicKey, ClearSecretKey,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeError {
    /// A vector does not match the number of batched slots
    #[error("Expected {expected} slots, got {got}")]
    SlotCount { expected: usize, got: usize },
    /// A ciphertext-ciphertext product was used before relinearization
    #[error("Ciphertext of degree {degree} must be relinearized first")]
    NotRelinearized { degree: u8 },
    /// The multiplicative depth of the parameters is used up
    #[error("Multiplicative depth exhausted (max {max})")]
    DepthExhausted { max: u32 },
    /// Operands were produced under different keys
    #[error("Ciphertext was produced under a different key")]
    KeyMismatch,
    /// Inner sum geometry not supported by the rotation keys
    #[error("Unsupported inner sum: step {step}, count {count}")]
    InnerSum { step: usize, count: usize },
    /// A serialized ciphertext could not be parsed
    #[error("Malformed ciphertext encoding: {0}")]
    Malformed(String),
    /// Invalid scheme parameters
    #[error("Invalid parameters: {0}")]
    Parameters(String),
    /// Failure reported by the underlying lattice library
    #[error("BFV backend error: {0}")]
    Backend(String),
}

pub type HeResult<T> = Result<T, HeError>;

/// Public-key capabilities: encode, encrypt and evaluate, but not decrypt.
///
/// Binary operators are destructive on their first operand, mirroring the
/// in-place evaluator calls of lattice libraries. Callers that need the
/// operand afterwards clone it first.
pub trait HeEvaluator: Send + Sync {
    type Plaintext: Clone + Send + Sync;
    type Ciphertext: Clone + Send + Sync;

    /// Number of SIMD slots per plaintext/ciphertext.
    fn slot_count(&self) -> usize;

    /// The plaintext modulus `t`.
    fn plain_modulus(&self) -> u64;

    /// Encodes `values` at the maximal level. Shorter inputs are zero padded;
    /// negative values are reduced into `Z_t`.
    fn encode(&self, values: &[i64]) -> HeResult<Self::Plaintext>;

    fn encrypt(&self, pt: &Self::Plaintext) -> HeResult<Self::Ciphertext>;

    fn add(&self, ct: &mut Self::Ciphertext, other: &Self::Ciphertext) -> HeResult<()>;

    fn add_plain(&self, ct: &mut Self::Ciphertext, pt: &Self::Plaintext) -> HeResult<()>;

    fn sub(&self, ct: &mut Self::Ciphertext, other: &Self::Ciphertext) -> HeResult<()>;

    fn sub_plain(&self, ct: &mut Self::Ciphertext, pt: &Self::Plaintext) -> HeResult<()>;

    /// Ciphertext-ciphertext product. The result has an expanded size and
    /// must go through [`HeEvaluator::relinearize`] before any further
    /// product.
    fn mul(&self, ct: &Self::Ciphertext, other: &Self::Ciphertext) -> HeResult<Self::Ciphertext>;

    fn mul_plain(&self, ct: &mut Self::Ciphertext, pt: &Self::Plaintext) -> HeResult<()>;

    fn relinearize(&self, ct: &mut Self::Ciphertext) -> HeResult<()>;

    fn mul_scalar(&self, ct: &mut Self::Ciphertext, scalar: u64) -> HeResult<()>;

    /// Rotate-and-accumulate: afterwards slot `i` holds
    /// `sum_{j < count} slot[i + j * step]`, rotations staying within a row
    /// of the slot matrix.
    fn inner_sum(&self, ct: &mut Self::Ciphertext, step: usize, count: usize) -> HeResult<()>;

    /// The provider's native binary ciphertext encoding.
    fn serialize_ciphertext(&self, ct: &Self::Ciphertext) -> HeResult<Vec<u8>>;

    fn deserialize_ciphertext(&self, bytes: &[u8]) -> HeResult<Self::Ciphertext>;
}

/// Capabilities reserved to the key owner.
pub trait HeDecryptor: HeEvaluator {
    fn decrypt(&self, ct: &Self::Ciphertext) -> HeResult<Self::Plaintext>;

    /// Decodes every slot as an element of `[0, t)`.
    fn decode(&self, pt: &Self::Plaintext) -> HeResult<Vec<u64>>;

    fn decrypt_decode(&self, ct: &Self::Ciphertext) -> HeResult<Vec<u64>> {
        self.decode(&self.decrypt(ct)?)
    }
}

/// Reads a value of `Z_t` symmetrically: values above `t/2` are negative.
pub fn to_signed(value: u64, plain_modulus: u64) -> i64 {
    if value > plain_modulus / 2 {
        value as i64 - plain_modulus as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::to_signed;

    #[test]
    fn signed_interpretation() {
        assert_eq!(to_signed(0, 17), 0);
        assert_eq!(to_signed(8, 17), 8);
        assert_eq!(to_signed(9, 17), -8);
        assert_eq!(to_signed(16, 17), -1);
    }
}
