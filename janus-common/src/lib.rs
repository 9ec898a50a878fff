pub mod bio;
pub mod config;
pub mod error;
pub mod he;
pub mod layout;
pub mod tracing;

/// Percentage points of disagreement below which two iris templates match.
pub const MATCH_THRESHOLD: u64 = 40;

/// Squared Euclidean distance below which two fingerprint templates match.
pub const EUCLIDEAN_THRESHOLD: u64 = 10_000;

/// Scale applied to the Hamming sum so the threshold comparison stays integral.
pub const HAMMING_SCALE: u64 = 100;

/// Domain of iris template and mask values.
pub const IRIS_DOMAIN: u64 = 2;

pub use error::{Error, Result};

static_assertions::const_assert!(MATCH_THRESHOLD <= HAMMING_SCALE);
