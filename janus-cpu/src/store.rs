//! Encrypted enrollment databases, built once from plaintext records.
use crate::{
    packer::StripePacker,
    protocol::IrisStripSet,
    strip::CipherStrip,
};
use janus_common::{
    bio::{BiometricKind, PlainBio},
    error::{Error, Result},
    he::HeEvaluator,
    layout::LayoutParams,
};
use tracing::{info, instrument};

/// Checks the records against the layout before anything gets encrypted.
fn validate_records(layout: &LayoutParams, records: &[PlainBio]) -> Result<()> {
    if records.len() != layout.db_size() {
        return Err(Error::packing(Error::layout(format!(
            "got {} records, dbSize is {}",
            records.len(),
            layout.db_size()
        ))));
    }
    for (idx, record) in records.iter().enumerate() {
        record
            .validate(layout.kind(), layout.template_size(), layout.domain())
            .map_err(|e| match e {
                Error::LayoutMismatch(mes) => {
                    Error::packing(Error::layout(format!("record {idx}: {mes}")))
                }
                other => other,
            })?;
    }
    Ok(())
}

/// Fingerprint database: one ciphertext strip per `records_per_ciphertext`
/// templates.
#[derive(Debug, Clone)]
pub struct FingerprintStore<C> {
    layout: LayoutParams,
    strips: Vec<CipherStrip<C>>,
}

impl<C> FingerprintStore<C> {
    #[instrument(level = "debug", skip_all, fields(db_size = records.len()))]
    pub fn build<H>(he: &H, packer: &StripePacker, records: &[PlainBio]) -> Result<Self>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        let layout = *packer.layout();
        if layout.kind() != BiometricKind::Finger {
            return Err(Error::UnsupportedModality(layout.kind().to_string()));
        }
        validate_records(&layout, records)?;
        let data: Vec<&[i64]> = records.iter().map(|r| r.data.as_slice()).collect();
        let strips = packer
            .pack::<H::Plaintext, _>(&data)
            .map_err(Error::packing)?
            .iter()
            .map(|strip| strip.encrypt(he))
            .collect::<Result<Vec<_>>>()?;
        info!(strips = strips.len(), "Encrypted fingerprint database");
        Ok(Self { layout, strips })
    }

    pub fn layout(&self) -> &LayoutParams {
        &self.layout
    }

    pub fn strips(&self) -> &[CipherStrip<C>] {
        &self.strips
    }

    pub fn len(&self) -> usize {
        self.strips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}

impl<C: Clone> FingerprintStore<C> {
    /// An owned working copy of strip `idx`.
    pub fn snapshot(&self, idx: usize) -> CipherStrip<C> {
        self.strips[idx].clone()
    }
}

/// Iris database: per strip, the three encrypted masked products.
#[derive(Debug, Clone)]
pub struct IrisStore<C> {
    layout: LayoutParams,
    strips: Vec<IrisStripSet<C>>,
}

impl<C> IrisStore<C> {
    #[instrument(level = "debug", skip_all, fields(db_size = records.len()))]
    pub fn build<H>(he: &H, packer: &StripePacker, records: &[PlainBio]) -> Result<Self>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        let layout = *packer.layout();
        if layout.kind() != BiometricKind::Iris {
            return Err(Error::UnsupportedModality(layout.kind().to_string()));
        }
        validate_records(&layout, records)?;
        let data: Vec<&[i64]> = records.iter().map(|r| r.data.as_slice()).collect();
        let masks: Vec<&[i64]> = records
            .iter()
            .filter_map(|r| r.mask.as_deref())
            .collect();
        let data = packer
            .pack::<H::Plaintext, _>(&data)
            .map_err(Error::packing)?;
        let masks = packer
            .pack::<H::Plaintext, _>(&masks)
            .map_err(Error::packing)?;
        let strips = data
            .iter()
            .zip(&masks)
            .map(|(d, m)| IrisStripSet::encrypt(he, d, m))
            .collect::<Result<Vec<_>>>()?;
        info!(strips = strips.len(), "Encrypted iris database");
        Ok(Self { layout, strips })
    }

    pub fn layout(&self) -> &LayoutParams {
        &self.layout
    }

    pub fn strips(&self) -> &[IrisStripSet<C>] {
        &self.strips
    }

    pub fn len(&self) -> usize {
        self.strips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}

impl<C: Clone> IrisStore<C> {
    /// An owned working copy of the masked products of strip `idx`. Queries
    /// multiply into these in place, so the canonical store is never handed
    /// out directly.
    pub fn snapshot(&self, idx: usize) -> IrisStripSet<C> {
        self.strips[idx].clone()
    }
}
