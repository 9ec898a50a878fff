//! A plaintext-simulated BFV backend.
//!
//! Ciphertexts carry their slot values in the clear, so this backend gives
//! no confidentiality whatsoever. It reproduces the algebra and the
//! bookkeeping that the protocols depend on: arithmetic modulo `t`, the
//! `2 x N/2` slot matrix with row-wise column rotations, ciphertext size
//! growth after a ct-ct product, a multiplicative depth budget and key
//! binding. Protocol bugs that a real scheme would surface (missing
//! relinearization, depth overflow, mixing keys) surface here as errors.
use super::{HeDecryptor, HeError, HeEvaluator, HeResult};
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Degree of a fresh or relinearized ciphertext.
const FRESH_DEGREE: u8 = 1;
/// Degree right after a ciphertext-ciphertext product.
const EXPANDED_DEGREE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearBfvParams {
    pub ring_slots: usize,
    pub plain_modulus: u64,
    pub max_depth: u32,
}

impl ClearBfvParams {
    /// N = 4096 with the 26-bit plaintext prime `0x3ee0001`.
    pub const PN12: ClearBfvParams = ClearBfvParams {
        ring_slots: 4096,
        plain_modulus: 0x3ee0001,
        max_depth: 2,
    };

    pub fn new(ring_slots: usize, plain_modulus: u64, max_depth: u32) -> HeResult<Self> {
        if ring_slots < 2 || !ring_slots.is_power_of_two() {
            return Err(HeError::Parameters(format!(
                "ring slots {ring_slots} is not a power of two"
            )));
        }
        if !(3..1 << 61).contains(&plain_modulus) {
            return Err(HeError::Parameters(format!(
                "plaintext modulus {plain_modulus} out of range"
            )));
        }
        Ok(Self {
            ring_slots,
            plain_modulus,
            max_depth,
        })
    }

    fn row_len(&self) -> usize {
        self.ring_slots / 2
    }
}

impl Default for ClearBfvParams {
    fn default() -> Self {
        Self::PN12
    }
}

/// Marker for handles that hold the secret key.
#[derive(Debug, Clone, Copy)]
pub struct Secret;

/// Marker for handles derived from the public and evaluation keys only.
#[derive(Debug, Clone, Copy)]
pub struct Public;

/// Evaluator handle of the simulated scheme. `K` records whether the handle
/// may decrypt.
#[derive(Debug, Clone)]
pub struct ClearBfv<K = Public> {
    params: ClearBfvParams,
    key_id: u64,
    _key: PhantomData<K>,
}

pub type ClearSecretKey = ClearBfv<Secret>;
pub type ClearPublicKey = ClearBfv<Public>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearPlaintext {
    slots: Vec<u64>,
}

impl ClearPlaintext {
    pub fn slots(&self) -> &[u64] {
        &self.slots
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCiphertext {
    key_id: u64,
    degree: u8,
    depth: u32,
    slots: Vec<u64>,
}

impl ClearCiphertext {
    pub fn degree(&self) -> u8 {
        self.degree
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl ClearBfv<Secret> {
    pub fn keygen<R: Rng + CryptoRng>(params: ClearBfvParams, rng: &mut R) -> Self {
        Self {
            params,
            key_id: rng.gen(),
            _key: PhantomData,
        }
    }

    /// A handle that can encode, encrypt and evaluate but not decrypt.
    pub fn public_handle(&self) -> ClearPublicKey {
        ClearBfv {
            params: self.params,
            key_id: self.key_id,
            _key: PhantomData,
        }
    }
}

impl<K> ClearBfv<K> {
    pub fn params(&self) -> &ClearBfvParams {
        &self.params
    }

    fn t(&self) -> u64 {
        self.params.plain_modulus
    }

    fn check(&self, ct: &ClearCiphertext) -> HeResult<()> {
        if ct.key_id != self.key_id {
            return Err(HeError::KeyMismatch);
        }
        self.check_len(ct.slots.len())
    }

    fn check_len(&self, got: usize) -> HeResult<()> {
        if got != self.params.ring_slots {
            return Err(HeError::SlotCount {
                expected: self.params.ring_slots,
                got,
            });
        }
        Ok(())
    }

    fn zip_in_place(&self, lhs: &mut [u64], rhs: &[u64], f: impl Fn(u64, u64, u64) -> u64) {
        let t = self.t();
        for (a, &b) in lhs.iter_mut().zip(rhs) {
            *a = f(*a, b, t);
        }
    }

    fn next_depth(&self, depth: u32) -> HeResult<u32> {
        let depth = depth + 1;
        if depth > self.params.max_depth {
            return Err(HeError::DepthExhausted {
                max: self.params.max_depth,
            });
        }
        Ok(depth)
    }
}

fn add_mod(a: u64, b: u64, t: u64) -> u64 {
    (a + b) % t
}

fn sub_mod(a: u64, b: u64, t: u64) -> u64 {
    (a + t - b) % t
}

fn mul_mod(a: u64, b: u64, t: u64) -> u64 {
    ((a as u128 * b as u128) % t as u128) as u64
}

impl<K: Send + Sync> HeEvaluator for ClearBfv<K> {
    type Plaintext = ClearPlaintext;
    type Ciphertext = ClearCiphertext;

    fn slot_count(&self) -> usize {
        self.params.ring_slots
    }

    fn plain_modulus(&self) -> u64 {
        self.t()
    }

    fn encode(&self, values: &[i64]) -> HeResult<ClearPlaintext> {
        if values.len() > self.params.ring_slots {
            return Err(HeError::SlotCount {
                expected: self.params.ring_slots,
                got: values.len(),
            });
        }
        let t = self.t() as i64;
        let mut slots = vec![0; self.params.ring_slots];
        for (slot, v) in slots.iter_mut().zip(values) {
            *slot = v.rem_euclid(t) as u64;
        }
        Ok(ClearPlaintext { slots })
    }

    fn encrypt(&self, pt: &ClearPlaintext) -> HeResult<ClearCiphertext> {
        self.check_len(pt.slots.len())?;
        Ok(ClearCiphertext {
            key_id: self.key_id,
            degree: FRESH_DEGREE,
            depth: 0,
            slots: pt.slots.clone(),
        })
    }

    fn add(&self, ct: &mut ClearCiphertext, other: &ClearCiphertext) -> HeResult<()> {
        self.check(ct)?;
        self.check(other)?;
        self.zip_in_place(&mut ct.slots, &other.slots, add_mod);
        ct.degree = ct.degree.max(other.degree);
        ct.depth = ct.depth.max(other.depth);
        Ok(())
    }

    fn add_plain(&self, ct: &mut ClearCiphertext, pt: &ClearPlaintext) -> HeResult<()> {
        self.check(ct)?;
        self.check_len(pt.slots.len())?;
        self.zip_in_place(&mut ct.slots, &pt.slots, add_mod);
        Ok(())
    }

    fn sub(&self, ct: &mut ClearCiphertext, other: &ClearCiphertext) -> HeResult<()> {
        self.check(ct)?;
        self.check(other)?;
        self.zip_in_place(&mut ct.slots, &other.slots, sub_mod);
        ct.degree = ct.degree.max(other.degree);
        ct.depth = ct.depth.max(other.depth);
        Ok(())
    }

    fn sub_plain(&self, ct: &mut ClearCiphertext, pt: &ClearPlaintext) -> HeResult<()> {
        self.check(ct)?;
        self.check_len(pt.slots.len())?;
        self.zip_in_place(&mut ct.slots, &pt.slots, sub_mod);
        Ok(())
    }

    fn mul(&self, ct: &ClearCiphertext, other: &ClearCiphertext) -> HeResult<ClearCiphertext> {
        self.check(ct)?;
        self.check(other)?;
        for degree in [ct.degree, other.degree] {
            if degree != FRESH_DEGREE {
                return Err(HeError::NotRelinearized { degree });
            }
        }
        let depth = self.next_depth(ct.depth.max(other.depth))?;
        let mut out = ct.clone();
        self.zip_in_place(&mut out.slots, &other.slots, mul_mod);
        out.degree = EXPANDED_DEGREE;
        out.depth = depth;
        Ok(out)
    }

    fn mul_plain(&self, ct: &mut ClearCiphertext, pt: &ClearPlaintext) -> HeResult<()> {
        self.check(ct)?;
        self.check_len(pt.slots.len())?;
        ct.depth = self.next_depth(ct.depth)?;
        self.zip_in_place(&mut ct.slots, &pt.slots, mul_mod);
        Ok(())
    }

    fn relinearize(&self, ct: &mut ClearCiphertext) -> HeResult<()> {
        self.check(ct)?;
        ct.degree = FRESH_DEGREE;
        Ok(())
    }

    fn mul_scalar(&self, ct: &mut ClearCiphertext, scalar: u64) -> HeResult<()> {
        self.check(ct)?;
        let t = self.t();
        let scalar = scalar % t;
        for slot in ct.slots.iter_mut() {
            *slot = mul_mod(*slot, scalar, t);
        }
        Ok(())
    }

    fn inner_sum(&self, ct: &mut ClearCiphertext, step: usize, count: usize) -> HeResult<()> {
        self.check(ct)?;
        let row = self.params.row_len();
        if step == 0 || count == 0 || step * count > row {
            return Err(HeError::InnerSum { step, count });
        }
        let t = self.t();
        let input = ct.slots.clone();
        for (r, out_row) in ct.slots.chunks_exact_mut(row).enumerate() {
            let in_row = &input[r * row..(r + 1) * row];
            for (c, out) in out_row.iter_mut().enumerate() {
                *out = (0..count).fold(0, |acc, j| add_mod(acc, in_row[(c + j * step) % row], t));
            }
        }
        Ok(())
    }

    fn serialize_ciphertext(&self, ct: &ClearCiphertext) -> HeResult<Vec<u8>> {
        self.check(ct)?;
        bincode::serialize(ct).map_err(|e| HeError::Malformed(e.to_string()))
    }

    fn deserialize_ciphertext(&self, bytes: &[u8]) -> HeResult<ClearCiphertext> {
        let ct: ClearCiphertext =
            bincode::deserialize(bytes).map_err(|e| HeError::Malformed(e.to_string()))?;
        self.check(&ct)?;
        if !(FRESH_DEGREE..=EXPANDED_DEGREE).contains(&ct.degree) {
            return Err(HeError::Malformed(format!("invalid degree {}", ct.degree)));
        }
        if ct.slots.iter().any(|&v| v >= self.t()) {
            return Err(HeError::Malformed("slot value outside of Z_t".to_string()));
        }
        Ok(ct)
    }
}

impl HeDecryptor for ClearBfv<Secret> {
    fn decrypt(&self, ct: &ClearCiphertext) -> HeResult<ClearPlaintext> {
        self.check(ct)?;
        Ok(ClearPlaintext {
            slots: ct.slots.clone(),
        })
    }

    fn decode(&self, pt: &ClearPlaintext) -> HeResult<Vec<u64>> {
        self.check_len(pt.slots.len())?;
        Ok(pt.slots.clone())
    }
}
