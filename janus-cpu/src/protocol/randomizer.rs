use janus_common::{error::Result, he::HeEvaluator};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A plaintext that is zero at every multiple of `step` and uniform in
/// `Z_t` everywhere else. Drawn from a freshly seeded CSPRNG on each call.
pub fn internal_slot_randomizer<H: HeEvaluator>(he: &H, step: usize) -> Result<H::Plaintext> {
    let t = he.plain_modulus();
    let mut rng = ChaCha20Rng::from_entropy();
    let values: Vec<i64> = (0..he.slot_count())
        .map(|i| {
            if i % step == 0 {
                0
            } else {
                rng.gen_range(0..t) as i64
            }
        })
        .collect();
    Ok(he.encode(&values)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_common::he::{ClearBfv, ClearBfvParams};
    use rand::rngs::StdRng;

    #[test]
    fn zero_at_result_slots() {
        let mut rng = StdRng::seed_from_u64(0);
        let sk = ClearBfv::keygen(ClearBfvParams::new(256, 0x3ee0001, 2).unwrap(), &mut rng);
        let a = internal_slot_randomizer(&sk, 8).unwrap();
        let b = internal_slot_randomizer(&sk, 8).unwrap();
        assert!(a.slots().iter().step_by(8).all(|&v| v == 0));
        assert!(a.slots().iter().all(|&v| v < 0x3ee0001));
        assert_ne!(a, b);
    }
}
