use eyre::Result;
use float_eq::assert_float_eq;
use janus_common::{
    bio::{BiometricKind, PlainBio},
    config::Config,
    he::{to_signed, ClearBfv, ClearBfvParams, ClearSecretKey, HeDecryptor, HeEvaluator},
    layout::LayoutParams,
    Error,
};
use janus_cpu::{
    codec::{decode_scores, deserialize_batch, serialize_batch},
    database_generators::{
        ground_truth_distances, ground_truth_scores, matching_query, random_database,
    },
    shares::{mask_distances, membership, reconstruct, MatchRule},
    DistanceEngine, JanusSession,
};
use rand::{rngs::StdRng, SeedableRng};
use rstest::rstest;

const RING_SLOTS: usize = 512;

fn keys(seed: u64) -> ClearSecretKey {
    let mut rng = StdRng::seed_from_u64(seed);
    ClearBfv::keygen(ClearBfvParams::new(RING_SLOTS, 0x3ee0001, 2).unwrap(), &mut rng)
}

fn config(kind: BiometricKind, db_size: usize, template_size: usize) -> Config {
    let slots_per_ctx = 4;
    Config {
        db_size,
        template_size,
        domain: if kind == BiometricKind::Iris { 2 } else { 256 },
        biometric_kind: kind.to_string(),
        ctx_per_template: template_size / slots_per_ctx,
        slots_per_ctx,
        ring_slots: RING_SLOTS,
        num_threads: 3,
        ..Default::default()
    }
}

#[rstest]
#[case(BiometricKind::Finger, 300, 64)]
#[case(BiometricKind::Finger, 128, 32)]
#[case(BiometricKind::Iris, 300, 64)]
#[case(BiometricKind::Iris, 50, 128)]
fn decoded_scores_match_plaintext(
    #[case] kind: BiometricKind,
    #[case] db_size: usize,
    #[case] template_size: usize,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(db_size as u64);
    let sk = keys(1);
    let pk = sk.public_handle();
    let config = config(kind, db_size, template_size);
    let layout = config.layout()?;

    let db = random_database(&mut rng, &layout);
    let query = matching_query(&mut rng, &layout, &db, db_size / 2, 0.9);

    let session = JanusSession::enroll(&pk, &config, &db)?;
    let distances = session.identify(&query)?;
    assert_eq!(distances.len(), layout.strip_count());

    let scores = decode_scores(&sk, &distances, layout.slots_per_ctx(), db_size, false)?;
    assert_eq!(
        scores,
        ground_truth_scores(&layout, &db, &query, pk.plain_modulus())
    );
    Ok(())
}

#[test]
fn fake_match_is_closest() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(21);
    let sk = keys(2);
    let config = config(BiometricKind::Finger, 256, 64);
    let layout = config.layout()?;
    let db = random_database(&mut rng, &layout);
    let session = JanusSession::enroll(&sk, &config, &db)?;

    for target in [0, 77, 255] {
        let query = matching_query(&mut rng, &layout, &db, target, 0.9);
        let agree = query
            .data
            .iter()
            .zip(&db[target].data)
            .filter(|(a, b)| a == b)
            .count();
        assert_float_eq!(agree as f64 / 64.0, 0.9, abs <= 0.15);

        let scores = decode_scores(&sk, &session.identify(&query)?, 4, 256, false)?;
        let best = scores
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| **s)
            .map(|(idx, _)| idx);
        assert_eq!(best, Some(target));
    }
    Ok(())
}

#[rstest]
#[case(1.0, true)]
#[case(0.9, true)]
#[case(0.0, false)]
fn iris_sign_convention(#[case] similarity: f64, #[case] expect_match: bool) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(33);
    let sk = keys(3);
    let config = config(BiometricKind::Iris, 64, 256);
    let layout = config.layout()?;
    let db = random_database(&mut rng, &layout);
    let query = matching_query(&mut rng, &layout, &db, 10, similarity);

    let session = JanusSession::enroll(&sk, &config, &db)?;
    let scores = decode_scores(&sk, &session.identify(&query)?, 4, 64, false)?;
    let truth = ground_truth_distances(&layout, &db, &query);

    for (k, (&score, &expected)) in scores.iter().zip(&truth).enumerate() {
        assert_eq!(to_signed(score, sk.plain_modulus()), expected, "record {k}");
        let (hamming, overlap) = db[k].hamming_fraction(&query);
        assert_eq!(
            expected < 0,
            (hamming as f64) / (overlap as f64) < 0.4,
            "record {k}"
        );
    }
    assert_eq!(session.match_rule().is_match(scores[10]), expect_match);
    Ok(())
}

#[test]
fn noise_slots_are_fresh_per_query() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(4);
    let sk = keys(4);
    let config = config(BiometricKind::Iris, 100, 64);
    let layout = config.layout()?;
    let db = random_database(&mut rng, &layout);
    let query = matching_query(&mut rng, &layout, &db, 0, 0.8);
    let session = JanusSession::enroll(&sk, &config, &db)?;

    let first = session.identify(&query)?;
    let second = session.identify(&query)?;
    assert_eq!(
        decode_scores(&sk, &first, 4, 100, false)?,
        decode_scores(&sk, &second, 4, 100, false)?
    );

    let slots_a = sk.decrypt_decode(&first[0])?;
    let slots_b = sk.decrypt_decode(&second[0])?;
    let fresh = (0..RING_SLOTS)
        .filter(|i| i % 4 != 0 && slots_a[*i] != slots_b[*i])
        .count();
    assert!(fresh > RING_SLOTS / 2, "only {fresh} noise slots changed");
    Ok(())
}

#[test]
fn iris_store_survives_repeated_queries() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let sk = keys(5);
    let config = config(BiometricKind::Iris, 40, 64);
    let layout = config.layout()?;
    let db = random_database(&mut rng, &layout);
    let session = JanusSession::enroll(&sk, &config, &db)?;
    let JanusSession::Iris(enrolled) = &session else {
        eyre::bail!("expected an iris session");
    };
    let before = enrolled.store().strips()[0].template_mask.rows()[0].clone();

    for idx in [3, 3, 17] {
        let query = matching_query(&mut rng, &layout, &db, idx, 0.95);
        let scores = decode_scores(&sk, &session.identify(&query)?, 4, 40, false)?;
        assert_eq!(scores, ground_truth_scores(&layout, &db, &query, sk.plain_modulus()));
    }
    assert_eq!(enrolled.store().strips()[0].template_mask.rows()[0], before);
    Ok(())
}

#[test]
fn transport_round_trip() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(6);
    let sk = keys(6);
    let pk = sk.public_handle();
    let config = config(BiometricKind::Finger, 300, 64);
    let layout = config.layout()?;
    let db = random_database(&mut rng, &layout);
    let query = matching_query(&mut rng, &layout, &db, 1, 0.9);
    let distances = JanusSession::enroll(&pk, &config, &db)?.identify(&query)?;

    let blobs = serialize_batch(&pk, &distances)?;
    assert_eq!(blobs.len(), distances.len());
    let received = deserialize_batch(&sk, &blobs)?;
    assert_eq!(
        decode_scores(&sk, &received, 4, 300, false)?,
        decode_scores(&sk, &distances, 4, 300, false)?
    );

    let mut corrupted = blobs.clone();
    corrupted[2] = vec![0xff; 3];
    assert!(matches!(
        deserialize_batch(&sk, &corrupted),
        Err(Error::Codec(_))
    ));
    Ok(())
}

#[rstest]
#[case(BiometricKind::Finger, 2)]
#[case(BiometricKind::Iris, 1)]
#[case(BiometricKind::Iris, 4)]
fn masked_shares_drive_membership(
    #[case] kind: BiometricKind,
    #[case] templates_per_user: usize,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let sk = keys(7);
    let pk = sk.public_handle();
    let mut config = config(kind, 96, 64);
    config.templates_per_user = templates_per_user;
    let layout = config.layout()?;
    let mut db = random_database(&mut rng, &layout);
    let target = 40;
    // Every template of the target user shares the same values.
    let user_start = target - target % templates_per_user;
    for idx in user_start..user_start + templates_per_user {
        db[idx] = PlainBio {
            data: db[user_start].data.clone(),
            mask: db[idx].mask.clone(),
        };
    }
    let query = matching_query(&mut rng, &layout, &db, target, 1.0);

    let session = JanusSession::enroll(&pk, &config, &db)?;
    let distances = session.identify(&query)?;
    let shares = mask_distances(&pk, &mut rng, distances, layout.slots_per_ctx(), 96)?;
    let blinded = decode_scores(&sk, &shares.masked, layout.slots_per_ctx(), 96, true)?;
    let scores = reconstruct(&blinded, &shares.local_share, pk.plain_modulus())?;
    assert_eq!(scores, ground_truth_scores(&layout, &db, &query, pk.plain_modulus()));

    let rule = MatchRule::new(kind, config.euclidean_threshold, pk.plain_modulus());
    assert_eq!(rule, session.match_rule());
    let result = membership(&rule.matches(&scores), templates_per_user)?;
    assert!(result.is_member);
    assert!(result.matched_users.contains(&(target / templates_per_user)));
    Ok(())
}

#[test]
fn engine_rejects_mismatched_provider() {
    let sk = keys(8);
    let layout =
        LayoutParams::new(64, 16, 4, 4096, 10, 256, BiometricKind::Finger, 40).unwrap();
    assert!(matches!(
        DistanceEngine::new(&sk, layout, 1, false),
        Err(Error::LayoutMismatch(_))
    ));
}
