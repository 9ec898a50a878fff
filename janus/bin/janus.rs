use clap::Parser;
use eyre::{Context, Result};
use janus_common::{
    config::{Config, Opt},
    he::{FheBfv, FheBfvParams, HeEvaluator},
    tracing::initialize_tracing,
};
use janus_cpu::{
    codec::{batch_size, decode_scores, deserialize_batch, serialize_batch},
    database_generators::{matching_query, random_database},
    shares::{mask_distances, membership, reconstruct},
    JanusSession,
};
use rand::{thread_rng, Rng};
use std::time::Instant;

/// Fraction of values a synthetic query shares with its enrolled template.
const QUERY_SIMILARITY: f64 = 0.9;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut config = Config::load_config("JANUS").wrap_err("Failed to load config")?;
    config.overwrite_defaults_with_cli_args(Opt::parse());

    if let Err(e) = initialize_tracing() {
        eprintln!("Failed to initialize tracing: {:?}", e);
        return Err(e);
    }

    let layout = config.layout()?;
    let rng = &mut thread_rng();

    // Biometric provider: owns the secret key, hands out the public one.
    let now = Instant::now();
    let params = FheBfvParams::new(config.ring_slots, config.plain_modulus, config.max_depth)?;
    let sk = FheBfv::keygen(&params, layout.slots_per_ctx(), rng)?;
    let pk = sk.public_handle();
    tracing::info!(elapsed = ?now.elapsed(), "Generated keys");

    let db = random_database(rng, &layout);
    let target = rng.gen_range(0..layout.db_size());
    let query = matching_query(rng, &layout, &db, target, QUERY_SIMILARITY);
    tracing::info!(target, "Generated synthetic database and query");

    // Registration station: encrypts the database under the public key.
    let now = Instant::now();
    let session = JanusSession::enroll(&pk, &config, &db)?;
    tracing::info!(elapsed = ?now.elapsed(), "Enrolled database");

    let now = Instant::now();
    let distances = session.identify(&query)?;
    tracing::info!(elapsed = ?now.elapsed(), strips = distances.len(), "Identified query");

    let shares = mask_distances(
        &pk,
        rng,
        distances,
        layout.slots_per_ctx(),
        layout.db_size(),
    )?;
    let blobs = serialize_batch(&pk, &shares.masked)?;
    tracing::info!(bytes = batch_size(&blobs), "Sending masked distances");

    // Biometric provider: decodes its share of the scores.
    let now = Instant::now();
    let received = deserialize_batch(&sk, &blobs)?;
    let blinded = decode_scores(
        &sk,
        &received,
        layout.slots_per_ctx(),
        layout.db_size(),
        config.verbose,
    )?;
    tracing::info!(elapsed = ?now.elapsed(), "Decoded masked scores");

    let scores = reconstruct(&blinded, &shares.local_share, pk.plain_modulus())?;
    let matches = session.match_rule().matches(&scores);
    let result = membership(&matches, config.templates_per_user)?;
    tracing::info!(
        matched_users = ?result.matched_users,
        expected_user = target / config.templates_per_user,
        "Membership result: {}",
        result.is_member
    );
    Ok(())
}
