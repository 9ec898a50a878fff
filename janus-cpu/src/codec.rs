//! Transport encoding of distance batches and decoding of their result
//! slots.
//!
//! A batch is an ordered list of blobs, one per database strip. The order is
//! the strip order and carries the record correspondence.
use janus_common::{
    error::{Error, Result},
    he::{HeDecryptor, HeEvaluator},
};
use tracing::{debug, instrument};

pub fn serialize_batch<H: HeEvaluator>(he: &H, cts: &[H::Ciphertext]) -> Result<Vec<Vec<u8>>> {
    cts.iter()
        .map(|ct| Ok(he.serialize_ciphertext(ct)?))
        .collect()
}

pub fn deserialize_batch<H, B>(he: &H, blobs: &[B]) -> Result<Vec<H::Ciphertext>>
where
    H: HeEvaluator,
    B: AsRef<[u8]>,
{
    blobs
        .iter()
        .enumerate()
        .map(|(idx, blob)| {
            he.deserialize_ciphertext(blob.as_ref())
                .map_err(|e| Error::Codec(format!("blob {idx}: {e}")))
        })
        .collect()
}

/// Total number of bytes of a serialized batch.
pub fn batch_size<B: AsRef<[u8]>>(blobs: &[B]) -> usize {
    blobs.iter().map(|b| b.as_ref().len()).sum()
}

/// Decrypts every ciphertext and keeps the slots at multiples of
/// `slots_per_ctx`, in strip order, truncated to `db_size`. A batch holding
/// fewer than `db_size` result slots is rejected.
#[instrument(level = "debug", skip(he, cts))]
pub fn decode_scores<H: HeDecryptor>(
    he: &H,
    cts: &[H::Ciphertext],
    slots_per_ctx: usize,
    db_size: usize,
    verbose: bool,
) -> Result<Vec<u64>> {
    if slots_per_ctx == 0 {
        return Err(Error::layout("slotsPerCtx must be positive"));
    }
    let mut scores = Vec::with_capacity(db_size);
    for ct in cts {
        let slots = he.decrypt_decode(ct)?;
        if verbose && scores.is_empty() {
            debug!(values = ?&slots[..slots.len().min(16)], "Decoded slots of the first strip");
        }
        scores.extend(slots.into_iter().step_by(slots_per_ctx));
        if scores.len() >= db_size {
            break;
        }
    }
    if scores.len() < db_size {
        return Err(Error::Codec(format!(
            "batch of {} ciphertexts holds {} scores, expected {db_size}",
            cts.len(),
            scores.len()
        )));
    }
    scores.truncate(db_size);
    Ok(scores)
}
