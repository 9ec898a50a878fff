//! Modality dispatch. The biometric kind is resolved once, when a database
//! is enrolled; everything after that goes through a typed [`Enrolled`]
//! session.
use crate::{
    engine::DistanceEngine,
    protocol::IrisQuery,
    shares::MatchRule,
    store::{FingerprintStore, IrisStore},
    strip::PlainStrip,
};
use janus_common::{
    bio::{BiometricKind, PlainBio},
    config::Config,
    error::Result,
    he::HeEvaluator,
    layout::LayoutParams,
};
use std::marker::PhantomData;
use tracing::{info, instrument};

/// The operations that differ between biometric modalities.
pub trait Modality<H: HeEvaluator> {
    type Store: Send + Sync;
    type Query: Send + Sync;

    const KIND: BiometricKind;

    fn build_store(engine: &DistanceEngine<H>, records: &[PlainBio]) -> Result<Self::Store>;

    fn pack_query(engine: &DistanceEngine<H>, query: &PlainBio) -> Result<Self::Query>;

    fn compute_distance(
        engine: &DistanceEngine<H>,
        store: &Self::Store,
        query: &Self::Query,
    ) -> Result<Vec<H::Ciphertext>>;
}

/// Squared Euclidean distance over integer templates.
pub struct Fingerprint;

/// Thresholded normalized Hamming distance over masked binary templates.
pub struct Iris;

impl<H: HeEvaluator> Modality<H> for Fingerprint {
    type Store = FingerprintStore<H::Ciphertext>;
    type Query = PlainStrip<H::Plaintext>;

    const KIND: BiometricKind = BiometricKind::Finger;

    fn build_store(engine: &DistanceEngine<H>, records: &[PlainBio]) -> Result<Self::Store> {
        engine.build_fingerprint_store(records)
    }

    fn pack_query(engine: &DistanceEngine<H>, query: &PlainBio) -> Result<Self::Query> {
        engine.pack_fingerprint_query(query)
    }

    fn compute_distance(
        engine: &DistanceEngine<H>,
        store: &Self::Store,
        query: &Self::Query,
    ) -> Result<Vec<H::Ciphertext>> {
        engine.fingerprint_distances(store, query)
    }
}

impl<H: HeEvaluator> Modality<H> for Iris {
    type Store = IrisStore<H::Ciphertext>;
    type Query = IrisQuery<H::Plaintext>;

    const KIND: BiometricKind = BiometricKind::Iris;

    fn build_store(engine: &DistanceEngine<H>, records: &[PlainBio]) -> Result<Self::Store> {
        engine.build_iris_store(records)
    }

    fn pack_query(engine: &DistanceEngine<H>, query: &PlainBio) -> Result<Self::Query> {
        engine.pack_iris_query(query)
    }

    fn compute_distance(
        engine: &DistanceEngine<H>,
        store: &Self::Store,
        query: &Self::Query,
    ) -> Result<Vec<H::Ciphertext>> {
        engine.iris_distances(store, query)
    }
}

/// An encrypted database of one modality together with the engine that
/// queries it.
pub struct Enrolled<'a, H: HeEvaluator, M: Modality<H>> {
    engine: DistanceEngine<'a, H>,
    store: M::Store,
    rule: MatchRule,
    _modality: PhantomData<M>,
}

impl<'a, H: HeEvaluator, M: Modality<H>> Enrolled<'a, H, M> {
    pub fn new(
        engine: DistanceEngine<'a, H>,
        records: &[PlainBio],
        rule: MatchRule,
    ) -> Result<Self> {
        let store = M::build_store(&engine, records)?;
        Ok(Self {
            engine,
            store,
            rule,
            _modality: PhantomData,
        })
    }

    pub fn engine(&self) -> &DistanceEngine<'a, H> {
        &self.engine
    }

    pub fn store(&self) -> &M::Store {
        &self.store
    }

    /// One encrypted distance per database strip, in strip order.
    pub fn identify(&self, query: &PlainBio) -> Result<Vec<H::Ciphertext>> {
        let query = M::pack_query(&self.engine, query)?;
        M::compute_distance(&self.engine, &self.store, &query)
    }
}

pub enum JanusSession<'a, H: HeEvaluator> {
    Finger(Enrolled<'a, H, Fingerprint>),
    Iris(Enrolled<'a, H, Iris>),
}

impl<'a, H: HeEvaluator> JanusSession<'a, H> {
    /// Validates the configuration against the provider and encrypts
    /// `records` as the enrollment database.
    #[instrument(level = "info", skip_all, fields(kind = %config.biometric_kind))]
    pub fn enroll(he: &'a H, config: &Config, records: &[PlainBio]) -> Result<Self> {
        let layout = config.layout()?;
        let engine = DistanceEngine::new(he, layout, config.num_threads, config.verbose)?;
        let rule = MatchRule::new(layout.kind(), config.euclidean_threshold, he.plain_modulus());
        let session = match layout.kind() {
            BiometricKind::Finger => JanusSession::Finger(Enrolled::new(engine, records, rule)?),
            BiometricKind::Iris => JanusSession::Iris(Enrolled::new(engine, records, rule)?),
        };
        info!("{}", layout.describe());
        Ok(session)
    }

    pub fn identify(&self, query: &PlainBio) -> Result<Vec<H::Ciphertext>> {
        match self {
            JanusSession::Finger(enrolled) => enrolled.identify(query),
            JanusSession::Iris(enrolled) => enrolled.identify(query),
        }
    }

    pub fn layout(&self) -> &LayoutParams {
        match self {
            JanusSession::Finger(enrolled) => enrolled.engine.layout(),
            JanusSession::Iris(enrolled) => enrolled.engine.layout(),
        }
    }

    pub fn kind(&self) -> BiometricKind {
        match self {
            JanusSession::Finger(_) => <Fingerprint as Modality<H>>::KIND,
            JanusSession::Iris(_) => <Iris as Modality<H>>::KIND,
        }
    }

    pub fn match_rule(&self) -> MatchRule {
        match self {
            JanusSession::Finger(enrolled) => enrolled.rule,
            JanusSession::Iris(enrolled) => enrolled.rule,
        }
    }
}
