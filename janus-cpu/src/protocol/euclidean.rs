use crate::strip::{CipherStrip, PlainStrip};
use janus_common::{error::Result, he::HeEvaluator};

/// Squared Euclidean distance between every record of `working` and the
/// replicated `query`.
///
/// Record `k` of the strip ends up at slot `k * slots_per_ctx` of the result.
pub fn euclidean_distance<H: HeEvaluator>(
    he: &H,
    mut working: CipherStrip<H::Ciphertext>,
    query: &PlainStrip<H::Plaintext>,
) -> Result<H::Ciphertext> {
    working.sub_plain(he, query)?;
    working.square(he)?;
    working.stripe_sum(he)
}
