//! BFV over the `fhe` crate.
//!
//! Slots are SIMD-encoded, so the `2 x N/2` slot matrix and its column
//! rotations are the same as the simulated backend's. Only power-of-two
//! inner sums are supported; they are evaluated with `log2(count)` rotations
//! whose Galois keys are generated up front for a fixed span.
use super::{HeDecryptor, HeError, HeEvaluator, HeResult};
use fhe::bfv::{
    BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, EvaluationKey,
    EvaluationKeyBuilder, Plaintext, PublicKey, RelinearizationKey, SecretKey,
};
use fhe_traits::{
    DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter, Serialize,
};
use rand::{thread_rng, CryptoRng, Rng, RngCore};
use std::{fmt, sync::Arc};

/// Ciphertext-modulus bit sizes and the depth they support, per ring degree.
/// The total stays within the 128-bit security bound of each degree.
const MODULUS_CHAIN: &[(usize, &[usize], u32)] = &[
    (2048, &[54], 1),
    (4096, &[36, 36, 37], 2),
    (8192, &[43, 43, 44, 44, 44], 4),
    (16384, &[48, 48, 48, 49, 49, 49, 49, 49, 49], 8),
];

fn backend(err: fhe::Error) -> HeError {
    HeError::Backend(err.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FheBfvParams {
    pub ring_slots: usize,
    pub plain_modulus: u64,
    pub moduli_sizes: Vec<usize>,
}

impl FheBfvParams {
    /// Picks the modulus chain of `ring_slots` and checks it supports
    /// `max_depth` multiplications. SIMD batching needs a prime `t` with
    /// `t = 1 mod 2N`.
    pub fn new(ring_slots: usize, plain_modulus: u64, max_depth: u32) -> HeResult<Self> {
        let (_, sizes, depth) = MODULUS_CHAIN
            .iter()
            .find(|(degree, _, _)| *degree == ring_slots)
            .ok_or_else(|| {
                HeError::Parameters(format!("no modulus chain for ring slots {ring_slots}"))
            })?;
        if max_depth > *depth {
            return Err(HeError::Parameters(format!(
                "ring slots {ring_slots} support depth {depth}, {max_depth} requested"
            )));
        }
        if plain_modulus < 3 || plain_modulus % (2 * ring_slots as u64) != 1 {
            return Err(HeError::Parameters(format!(
                "plaintext modulus {plain_modulus} does not allow batching over {ring_slots} slots"
            )));
        }
        Ok(Self {
            ring_slots,
            plain_modulus,
            moduli_sizes: sizes.to_vec(),
        })
    }

    fn build(&self) -> HeResult<Arc<BfvParameters>> {
        BfvParametersBuilder::new()
            .set_degree(self.ring_slots)
            .set_plaintext_modulus(self.plain_modulus)
            .set_moduli_sizes(&self.moduli_sizes)
            .build_arc()
            .map_err(backend)
    }
}

/// Everything a party without the secret key evaluates with.
struct PublicKeys {
    par: Arc<BfvParameters>,
    pk: PublicKey,
    rk: RelinearizationKey,
    ek: EvaluationKey,
    key_id: u64,
}

/// Evaluator handle over real BFV. `K` is the secret key for the key owner
/// and `()` for handles that may only encrypt and evaluate.
#[derive(Clone)]
pub struct FheBfv<K = ()> {
    keys: Arc<PublicKeys>,
    secret: K,
}

pub type FheBfvSecretKey = FheBfv<Arc<SecretKey>>;
pub type FheBfvPublicKey = FheBfv<()>;

impl<K> fmt::Debug for FheBfv<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FheBfv")
            .field("degree", &self.keys.par.degree())
            .field("plain_modulus", &self.keys.par.plaintext())
            .field("key_id", &self.keys.key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FheBfvCiphertext {
    inner: Ciphertext,
    key_id: u64,
    expanded: bool,
}

impl FheBfvSecretKey {
    /// Generates the secret key together with the public, relinearization
    /// and rotation keys. Rotations are enabled for every power of two below
    /// `inner_sum_span`, which must cover `step * count` of later inner sums.
    pub fn keygen<R: RngCore + CryptoRng>(
        params: &FheBfvParams,
        inner_sum_span: usize,
        rng: &mut R,
    ) -> HeResult<Self> {
        let par = params.build()?;
        let row = params.ring_slots / 2;
        if inner_sum_span > row {
            return Err(HeError::Parameters(format!(
                "inner sum span {inner_sum_span} exceeds row length {row}"
            )));
        }
        let sk = SecretKey::random(&par, rng);
        let pk = PublicKey::new(&sk, rng);
        let rk = RelinearizationKey::new(&sk, rng).map_err(backend)?;
        let mut builder = EvaluationKeyBuilder::new(&sk).map_err(backend)?;
        let mut shift = 1;
        while shift < inner_sum_span {
            builder.enable_column_rotation(shift).map_err(backend)?;
            shift *= 2;
        }
        let ek = builder.build(rng).map_err(backend)?;
        Ok(Self {
            keys: Arc::new(PublicKeys {
                par,
                pk,
                rk,
                ek,
                key_id: rng.gen(),
            }),
            secret: Arc::new(sk),
        })
    }

    /// A handle that can encode, encrypt and evaluate but not decrypt.
    pub fn public_handle(&self) -> FheBfvPublicKey {
        FheBfv {
            keys: Arc::clone(&self.keys),
            secret: (),
        }
    }
}

impl<K> FheBfv<K> {
    fn check(&self, ct: &FheBfvCiphertext) -> HeResult<()> {
        if ct.key_id != self.keys.key_id {
            return Err(HeError::KeyMismatch);
        }
        Ok(())
    }

    fn wrap(&self, inner: Ciphertext) -> FheBfvCiphertext {
        FheBfvCiphertext {
            inner,
            key_id: self.keys.key_id,
            expanded: false,
        }
    }
}

impl<K: Clone + Send + Sync> HeEvaluator for FheBfv<K> {
    type Plaintext = Plaintext;
    type Ciphertext = FheBfvCiphertext;

    fn slot_count(&self) -> usize {
        self.keys.par.degree()
    }

    fn plain_modulus(&self) -> u64 {
        self.keys.par.plaintext()
    }

    fn encode(&self, values: &[i64]) -> HeResult<Plaintext> {
        if values.len() > self.slot_count() {
            return Err(HeError::SlotCount {
                expected: self.slot_count(),
                got: values.len(),
            });
        }
        Plaintext::try_encode(values, Encoding::simd(), &self.keys.par).map_err(backend)
    }

    fn encrypt(&self, pt: &Plaintext) -> HeResult<FheBfvCiphertext> {
        let ct: Ciphertext = self
            .keys
            .pk
            .try_encrypt(pt, &mut thread_rng())
            .map_err(backend)?;
        Ok(self.wrap(ct))
    }

    fn add(&self, ct: &mut FheBfvCiphertext, other: &FheBfvCiphertext) -> HeResult<()> {
        self.check(ct)?;
        self.check(other)?;
        ct.inner = &ct.inner + &other.inner;
        ct.expanded |= other.expanded;
        Ok(())
    }

    fn add_plain(&self, ct: &mut FheBfvCiphertext, pt: &Plaintext) -> HeResult<()> {
        self.check(ct)?;
        ct.inner = &ct.inner + pt;
        Ok(())
    }

    fn sub(&self, ct: &mut FheBfvCiphertext, other: &FheBfvCiphertext) -> HeResult<()> {
        self.check(ct)?;
        self.check(other)?;
        ct.inner = &ct.inner - &other.inner;
        ct.expanded |= other.expanded;
        Ok(())
    }

    fn sub_plain(&self, ct: &mut FheBfvCiphertext, pt: &Plaintext) -> HeResult<()> {
        self.check(ct)?;
        ct.inner = &ct.inner - pt;
        Ok(())
    }

    fn mul(&self, ct: &FheBfvCiphertext, other: &FheBfvCiphertext) -> HeResult<FheBfvCiphertext> {
        self.check(ct)?;
        self.check(other)?;
        if ct.expanded || other.expanded {
            return Err(HeError::NotRelinearized { degree: 2 });
        }
        let mut out = self.wrap(&ct.inner * &other.inner);
        out.expanded = true;
        Ok(out)
    }

    fn mul_plain(&self, ct: &mut FheBfvCiphertext, pt: &Plaintext) -> HeResult<()> {
        self.check(ct)?;
        ct.inner = &ct.inner * pt;
        Ok(())
    }

    fn relinearize(&self, ct: &mut FheBfvCiphertext) -> HeResult<()> {
        self.check(ct)?;
        if ct.expanded {
            self.keys.rk.relinearizes(&mut ct.inner).map_err(backend)?;
            ct.expanded = false;
        }
        Ok(())
    }

    fn mul_scalar(&self, ct: &mut FheBfvCiphertext, scalar: u64) -> HeResult<()> {
        self.check(ct)?;
        // A constant slot vector encodes to a constant polynomial.
        let constant = vec![scalar % self.plain_modulus(); self.slot_count()];
        let pt = Plaintext::try_encode(constant.as_slice(), Encoding::simd(), &self.keys.par)
            .map_err(backend)?;
        ct.inner = &ct.inner * &pt;
        Ok(())
    }

    fn inner_sum(&self, ct: &mut FheBfvCiphertext, step: usize, count: usize) -> HeResult<()> {
        self.check(ct)?;
        let row = self.slot_count() / 2;
        if step == 0 || !count.is_power_of_two() || step * count > row || ct.expanded {
            return Err(HeError::InnerSum { step, count });
        }
        let mut acc = ct.inner.clone();
        let mut shift = step;
        let mut remaining = count;
        while remaining > 1 {
            // Fails when no Galois key was generated for this shift.
            let rotated = self
                .keys
                .ek
                .rotates_columns_by(&acc, shift)
                .map_err(|_| HeError::InnerSum { step, count })?;
            acc = &acc + &rotated;
            shift *= 2;
            remaining /= 2;
        }
        ct.inner = acc;
        Ok(())
    }

    fn serialize_ciphertext(&self, ct: &FheBfvCiphertext) -> HeResult<Vec<u8>> {
        self.check(ct)?;
        if ct.expanded {
            return Err(HeError::NotRelinearized { degree: 2 });
        }
        Ok(ct.inner.to_bytes())
    }

    fn deserialize_ciphertext(&self, bytes: &[u8]) -> HeResult<FheBfvCiphertext> {
        let ct = Ciphertext::from_bytes(bytes, &self.keys.par)
            .map_err(|e| HeError::Malformed(e.to_string()))?;
        Ok(self.wrap(ct))
    }
}

impl HeDecryptor for FheBfvSecretKey {
    fn decrypt(&self, ct: &FheBfvCiphertext) -> HeResult<Plaintext> {
        self.check(ct)?;
        self.secret.try_decrypt(&ct.inner).map_err(backend)
    }

    fn decode(&self, pt: &Plaintext) -> HeResult<Vec<u64>> {
        Vec::<u64>::try_decode(pt, Encoding::simd()).map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const T: u64 = 0x3ee0001;

    fn keys(span: usize) -> FheBfvSecretKey {
        let mut rng = StdRng::seed_from_u64(42);
        let params = FheBfvParams::new(4096, T, 2).unwrap();
        FheBfv::keygen(&params, span, &mut rng).unwrap()
    }

    #[test]
    fn parameters_checked() {
        assert!(FheBfvParams::new(4096, T, 2).is_ok());
        assert!(FheBfvParams::new(4096, T, 3).is_err());
        assert!(FheBfvParams::new(1000, T, 1).is_err());
        // 65537 is not 1 mod 8192.
        assert!(FheBfvParams::new(4096, 65537, 1).is_err());
    }

    #[test]
    fn arithmetic_mod_t() {
        let sk = keys(2);
        let pk = sk.public_handle();
        let a = pk.encode(&[1, 2, 3, -1]).unwrap();
        let b = pk.encode(&[5, 5, 0, 2]).unwrap();

        let mut ct = pk.encrypt(&a).unwrap();
        pk.sub_plain(&mut ct, &b).unwrap();
        assert_eq!(sk.decrypt_decode(&ct).unwrap()[..4], [T - 4, T - 3, 3, T - 3]);

        let ct_a = pk.encrypt(&a).unwrap();
        let mut sq = pk.mul(&ct_a, &ct_a).unwrap();
        assert_eq!(
            pk.mul(&sq, &ct_a).unwrap_err(),
            HeError::NotRelinearized { degree: 2 }
        );
        pk.relinearize(&mut sq).unwrap();
        pk.mul_scalar(&mut sq, 100).unwrap();
        pk.add_plain(&mut sq, &b).unwrap();
        assert_eq!(sk.decrypt_decode(&sq).unwrap()[..5], [105, 405, 900, 102, 0]);
    }

    #[test]
    fn inner_sum_rotates_within_rows() {
        let sk = keys(4);
        let row = sk.slot_count() / 2;
        let mut values = vec![0; 2 * row];
        values[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        values[row..row + 4].copy_from_slice(&[10, 20, 30, 40]);
        values[2 * row - 1] = 7;
        let mut ct = sk.encrypt(&sk.encode(&values).unwrap()).unwrap();
        sk.inner_sum(&mut ct, 1, 4).unwrap();

        let slots = sk.decrypt_decode(&ct).unwrap();
        assert_eq!(slots[..3], [10, 14, 18]);
        assert_eq!(slots[row], 100);
        // The last slot of the second row wraps to the start of that row.
        assert_eq!(slots[2 * row - 1], 7 + 10 + 20 + 30);

        assert!(matches!(
            sk.inner_sum(&mut ct, 1, 8),
            Err(HeError::InnerSum { step: 1, count: 8 })
        ));
        assert!(sk.inner_sum(&mut ct, 1, 3).is_err());
    }

    #[test]
    fn serialized_ciphertext_hides_slots() {
        let sk = keys(2);
        let pk = sk.public_handle();
        let values = [201, 17, 99, 3];
        let ct = pk.encrypt(&pk.encode(&values).unwrap()).unwrap();
        let bytes = pk.serialize_ciphertext(&ct).unwrap();
        // A cleartext encoding would carry the slots as little-endian words.
        let needle: Vec<u8> = values.iter().flat_map(|v| (*v as u64).to_le_bytes()).collect();
        assert!(!bytes.windows(needle.len()).any(|w| w == needle.as_slice()));
        assert!(!format!("{ct:?}").contains("201, 17, 99, 3"));

        let back = sk.deserialize_ciphertext(&bytes).unwrap();
        assert_eq!(sk.decrypt_decode(&back).unwrap()[..4], [201, 17, 99, 3]);
        assert!(matches!(
            sk.deserialize_ciphertext(&bytes[..bytes.len() / 2]),
            Err(HeError::Malformed(_))
        ));
    }

    #[test]
    fn foreign_key_rejected() {
        let sk = keys(2);
        let mut rng = StdRng::seed_from_u64(43);
        let params = FheBfvParams::new(4096, T, 2).unwrap();
        let other = FheBfv::keygen(&params, 2, &mut rng).unwrap();
        let ct = other.encrypt(&other.encode(&[1]).unwrap()).unwrap();
        assert_eq!(sk.decrypt(&ct).unwrap_err(), HeError::KeyMismatch);
    }
}
