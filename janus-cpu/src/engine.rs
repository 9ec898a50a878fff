use crate::{
    packer::StripePacker,
    protocol::{euclidean_distance, normalized_hamming_distance, IrisQuery},
    store::{FingerprintStore, IrisStore},
    strip::PlainStrip,
};
use janus_common::{
    bio::PlainBio,
    error::{Error, Result},
    he::HeEvaluator,
    layout::LayoutParams,
};
use rayon::{
    iter::{IntoParallelIterator, ParallelIterator},
    ThreadPool, ThreadPoolBuilder,
};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Evaluates the distance protocols of one layout against encrypted
/// databases, one rayon task per database strip.
///
/// Only a public handle is needed. The handle is shared read-only between
/// workers; every worker owns the strip copy it mutates.
pub struct DistanceEngine<'a, H> {
    he: &'a H,
    packer: StripePacker,
    pool: ThreadPool,
    verbose: bool,
}

impl<'a, H: HeEvaluator> DistanceEngine<'a, H> {
    /// Fails if the provider's slot count disagrees with the layout or its
    /// plaintext modulus cannot hold the largest score of the layout.
    pub fn new(
        he: &'a H,
        layout: LayoutParams,
        num_threads: usize,
        verbose: bool,
    ) -> Result<Self> {
        layout.check_ring_slots(he.slot_count())?;
        layout.check_headroom(he.plain_modulus())?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        debug!(threads = pool.current_num_threads(), "{}", layout.describe());
        Ok(Self {
            he,
            packer: StripePacker::new(layout).verbose(verbose),
            pool,
            verbose,
        })
    }

    pub fn layout(&self) -> &LayoutParams {
        self.packer.layout()
    }

    pub fn packer(&self) -> &StripePacker {
        &self.packer
    }

    pub fn build_fingerprint_store(
        &self,
        records: &[PlainBio],
    ) -> Result<FingerprintStore<H::Ciphertext>> {
        FingerprintStore::build(self.he, &self.packer, records)
    }

    pub fn build_iris_store(&self, records: &[PlainBio]) -> Result<IrisStore<H::Ciphertext>> {
        IrisStore::build(self.he, &self.packer, records)
    }

    /// Runs `f` on every strip index in the pool and returns the results in
    /// strip order. The first error aborts the batch.
    fn run_per_strip<T, F>(&self, strips: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        let verbose = self.verbose;
        self.pool.install(|| {
            (0..strips)
                .into_par_iter()
                .map(|idx| {
                    let now = Instant::now();
                    let out = f(idx)?;
                    if verbose {
                        debug!(strip = idx, elapsed = ?now.elapsed(), "Evaluated strip");
                    }
                    Ok(out)
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Replicates and encodes a fingerprint query against every position of
    /// a strip.
    pub fn pack_fingerprint_query(&self, query: &PlainBio) -> Result<PlainStrip<H::Plaintext>> {
        let layout = self.layout();
        query.validate(layout.kind(), layout.template_size(), layout.domain())?;
        let strip = self.packer.replicate(&query.data)?;
        strip.encoded(self.he)?;
        Ok(strip)
    }

    pub fn pack_iris_query(&self, query: &PlainBio) -> Result<IrisQuery<H::Plaintext>> {
        let layout = self.layout();
        query.validate(layout.kind(), layout.template_size(), layout.domain())?;
        let query = IrisQuery::pack(&self.packer, query)?;
        for strip in [&query.data_mask, &query.complement_mask, &query.mask] {
            strip.encoded(self.he)?;
        }
        Ok(query)
    }

    /// One distance ciphertext per database strip.
    #[instrument(level = "debug", skip_all, fields(strips = store.len()))]
    pub fn fingerprint_distances(
        &self,
        store: &FingerprintStore<H::Ciphertext>,
        query: &PlainStrip<H::Plaintext>,
    ) -> Result<Vec<H::Ciphertext>> {
        let now = Instant::now();
        let out = self.run_per_strip(store.len(), |idx| {
            euclidean_distance(self.he, store.snapshot(idx), query)
        })?;
        info!(elapsed = ?now.elapsed(), "Computed Euclidean distances");
        Ok(out)
    }

    /// One score ciphertext per database strip. The store itself is left
    /// untouched.
    #[instrument(level = "debug", skip_all, fields(strips = store.len()))]
    pub fn iris_distances(
        &self,
        store: &IrisStore<H::Ciphertext>,
        query: &IrisQuery<H::Plaintext>,
    ) -> Result<Vec<H::Ciphertext>> {
        let now = Instant::now();
        let threshold = self.layout().match_threshold();
        let out = self.run_per_strip(store.len(), |idx| {
            normalized_hamming_distance(self.he, store.snapshot(idx), query, threshold)
        })?;
        info!(elapsed = ?now.elapsed(), "Computed normalized Hamming scores");
        Ok(out)
    }
}
