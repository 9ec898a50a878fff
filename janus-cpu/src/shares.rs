//! Additive masking of encrypted distances and the plaintext decision taken
//! on the recombined scores.
//!
//! The party holding the distance ciphertexts adds a uniform plaintext `r`
//! and keeps `-r mod t` at the result slots. The key owner only ever decodes
//! `d + r`.
use janus_common::{
    bio::BiometricKind,
    error::{Error, Result},
    he::{to_signed, HeEvaluator},
};
use rand::{CryptoRng, Rng};

#[derive(Debug, Clone)]
pub struct DistanceShares<C> {
    /// Distance ciphertexts blinded in every slot.
    pub masked: Vec<C>,
    /// `-r mod t` at the result slots, in record order.
    pub local_share: Vec<u64>,
}

pub fn mask_distances<H, R>(
    he: &H,
    rng: &mut R,
    distances: Vec<H::Ciphertext>,
    slots_per_ctx: usize,
    db_size: usize,
) -> Result<DistanceShares<H::Ciphertext>>
where
    H: HeEvaluator,
    R: Rng + CryptoRng,
{
    if slots_per_ctx == 0 {
        return Err(Error::layout("slotsPerCtx must be positive"));
    }
    let t = he.plain_modulus();
    let mut local_share = Vec::with_capacity(db_size);
    let mut masked = distances;
    for ct in masked.iter_mut() {
        let r: Vec<u64> = (0..he.slot_count()).map(|_| rng.gen_range(0..t)).collect();
        let values: Vec<i64> = r.iter().map(|&v| v as i64).collect();
        he.add_plain(ct, &he.encode(&values)?)?;
        local_share.extend(r.iter().step_by(slots_per_ctx).map(|&v| (t - v) % t));
    }
    if local_share.len() < db_size {
        return Err(Error::layout(format!(
            "{} distance ciphertexts cover {} records, expected {db_size}",
            masked.len(),
            local_share.len()
        )));
    }
    local_share.truncate(db_size);
    Ok(DistanceShares {
        masked,
        local_share,
    })
}

/// Recombines two additive shares modulo `t`.
pub fn reconstruct(a: &[u64], b: &[u64], plain_modulus: u64) -> Result<Vec<u64>> {
    if a.len() != b.len() {
        return Err(Error::layout(format!(
            "share lengths differ: {} != {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| ((x as u128 + y as u128) % plain_modulus as u128) as u64)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Squared distance strictly below the threshold.
    Euclidean { threshold: u64 },
    /// Score in the upper half of `Z_t`, read as negative.
    NormalizedHamming { plain_modulus: u64 },
}

impl MatchRule {
    pub fn new(kind: BiometricKind, euclidean_threshold: u64, plain_modulus: u64) -> Self {
        match kind {
            BiometricKind::Finger => MatchRule::Euclidean {
                threshold: euclidean_threshold,
            },
            BiometricKind::Iris => MatchRule::NormalizedHamming { plain_modulus },
        }
    }

    pub fn is_match(&self, score: u64) -> bool {
        match *self {
            MatchRule::Euclidean { threshold } => score < threshold,
            MatchRule::NormalizedHamming { plain_modulus } => to_signed(score, plain_modulus) < 0,
        }
    }

    pub fn matches(&self, scores: &[u64]) -> Vec<bool> {
        scores.iter().map(|&s| self.is_match(s)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Users whose templates all matched.
    pub matched_users: Vec<usize>,
    pub is_member: bool,
}

/// Groups `templates_per_user` consecutive match bits per user. A user
/// matches when every one of their templates does.
pub fn membership(matches: &[bool], templates_per_user: usize) -> Result<Membership> {
    if templates_per_user == 0 || matches.len() % templates_per_user != 0 {
        return Err(Error::layout(format!(
            "{} templates cannot be split into users of {} templates",
            matches.len(),
            templates_per_user
        )));
    }
    let matched_users: Vec<usize> = matches
        .chunks(templates_per_user)
        .enumerate()
        .filter(|(_, user)| user.iter().all(|&m| m))
        .map(|(idx, _)| idx)
        .collect();
    Ok(Membership {
        is_member: !matched_users.is_empty(),
        matched_users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_common::he::{ClearBfv, ClearBfvParams, HeDecryptor};
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    #[test]
    fn shares_recombine_to_distances() {
        let mut rng = StdRng::seed_from_u64(4);
        let sk = ClearBfv::keygen(ClearBfvParams::new(8, 101, 2).unwrap(), &mut rng);
        let distances: Vec<_> = [[7, 1, 9, 1, 0, 1, 100, 1], [3, 1, 4, 1, 5, 1, 6, 1]]
            .iter()
            .map(|v| sk.encrypt(&sk.encode(v).unwrap()).unwrap())
            .collect();
        let shares = mask_distances(&sk, &mut rng, distances, 2, 6).unwrap();
        assert_eq!(shares.local_share.len(), 6);

        let blinded: Vec<u64> = shares
            .masked
            .iter()
            .flat_map(|ct| sk.decrypt_decode(ct).unwrap().into_iter().step_by(2))
            .take(6)
            .collect();
        let scores = reconstruct(&blinded, &shares.local_share, 101).unwrap();
        assert_eq!(scores, vec![7, 9, 0, 100, 3, 4]);
    }

    #[test]
    fn masking_rejects_bad_geometry() {
        let mut rng = StdRng::seed_from_u64(4);
        let sk = ClearBfv::keygen(ClearBfvParams::new(8, 101, 2).unwrap(), &mut rng);
        let distances = vec![sk.encrypt(&sk.encode(&[1, 2]).unwrap()).unwrap()];
        assert!(matches!(
            mask_distances(&sk, &mut rng, distances.clone(), 0, 1),
            Err(Error::LayoutMismatch(_))
        ));
        assert!(matches!(
            mask_distances(&sk, &mut rng, distances, 2, 5),
            Err(Error::LayoutMismatch(m)) if m.contains("cover 4 records")
        ));
    }

    #[test]
    fn reconstruct_checks_lengths() {
        assert!(reconstruct(&[1, 2], &[1], 17).is_err());
    }

    #[rstest]
    #[case(MatchRule::Euclidean { threshold: 10_000 }, 9_999, true)]
    #[case(MatchRule::Euclidean { threshold: 10_000 }, 10_000, false)]
    #[case(MatchRule::NormalizedHamming { plain_modulus: 101 }, 51, true)]
    #[case(MatchRule::NormalizedHamming { plain_modulus: 101 }, 50, false)]
    #[case(MatchRule::NormalizedHamming { plain_modulus: 101 }, 0, false)]
    fn match_rules(#[case] rule: MatchRule, #[case] score: u64, #[case] expected: bool) {
        assert_eq!(rule.is_match(score), expected);
    }

    #[test]
    fn fuses_templates_per_user() {
        let bits = [true, false, true, true, false, false];
        let fused = membership(&bits, 2).unwrap();
        assert_eq!(fused.matched_users, vec![1]);
        assert!(fused.is_member);

        let single = membership(&[false, false, false], 1).unwrap();
        assert!(!single.is_member);

        assert!(membership(&bits, 4).is_err());
        assert!(membership(&bits, 0).is_err());
    }
}
