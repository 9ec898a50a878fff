//! Homomorphic distance protocols evaluated strip by strip.
//!
//! Every function here consumes the working copy of the database strip it
//! operates on. Callers holding a canonical store hand out clones.
pub mod euclidean;
pub mod hamming;
pub mod randomizer;

pub use euclidean::euclidean_distance;
pub use hamming::{normalized_hamming_distance, IrisQuery, IrisStripSet};
pub use randomizer::internal_slot_randomizer;
