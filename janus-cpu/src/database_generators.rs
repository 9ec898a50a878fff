use janus_common::{bio::PlainBio, layout::LayoutParams};
use rand::Rng;

/// `db_size` random templates of the layout's modality.
pub fn random_database<R: Rng>(rng: &mut R, layout: &LayoutParams) -> Vec<PlainBio> {
    (0..layout.db_size())
        .map(|_| {
            PlainBio::random_rng(
                rng,
                layout.template_size(),
                layout.domain(),
                layout.has_mask(),
            )
        })
        .collect()
}

/// A query agreeing with `db[idx]` on about a `similarity` fraction of its
/// values.
pub fn matching_query<R: Rng>(
    rng: &mut R,
    layout: &LayoutParams,
    db: &[PlainBio],
    idx: usize,
    similarity: f64,
) -> PlainBio {
    db[idx].fake_match(rng, similarity, layout.domain())
}

/// What the encrypted protocol computes for each record, without modular
/// reduction: squared Euclidean distances for fingerprints, thresholded
/// Hamming scores for irises.
pub fn ground_truth_distances(
    layout: &LayoutParams,
    db: &[PlainBio],
    query: &PlainBio,
) -> Vec<i64> {
    db.iter()
        .map(|record| {
            if layout.has_mask() {
                record.hamming_score(query, layout.match_threshold())
            } else {
                record.euclidean_distance(query) as i64
            }
        })
        .collect()
}

/// [`ground_truth_distances`] reduced into `Z_t`, comparable to decoded
/// slots.
pub fn ground_truth_scores(
    layout: &LayoutParams,
    db: &[PlainBio],
    query: &PlainBio,
    plain_modulus: u64,
) -> Vec<u64> {
    ground_truth_distances(layout, db, query)
        .into_iter()
        .map(|d| d.rem_euclid(plain_modulus as i64) as u64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_common::bio::BiometricKind;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn iris_database_is_masked_and_binary() {
        let mut rng = StdRng::seed_from_u64(8);
        let layout = LayoutParams::new(64, 16, 4, 256, 10, 2, BiometricKind::Iris, 40).unwrap();
        let db = random_database(&mut rng, &layout);
        assert_eq!(db.len(), 10);
        for record in &db {
            record.validate(BiometricKind::Iris, 64, 2).unwrap();
        }
    }

    #[test]
    fn self_query_scores() {
        let mut rng = StdRng::seed_from_u64(8);
        let layout = LayoutParams::new(64, 16, 4, 256, 10, 2, BiometricKind::Iris, 40).unwrap();
        let db = random_database(&mut rng, &layout);
        let query = matching_query(&mut rng, &layout, &db, 2, 1.0);
        assert_eq!(query.data, db[2].data);

        let truth = ground_truth_distances(&layout, &db, &query);
        assert!(truth[2] <= 0);
        let scores = ground_truth_scores(&layout, &db, &query, 65537);
        assert_eq!(scores[2], truth[2].rem_euclid(65537) as u64);
    }
}
