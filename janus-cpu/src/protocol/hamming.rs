use crate::{
    packer::StripePacker,
    strip::{CipherStrip, PlainStrip},
};
use janus_common::{
    bio::PlainBio,
    error::{Error, Result},
    he::HeEvaluator,
    HAMMING_SCALE,
};

/// The replicated plaintext factors an iris query contributes.
#[derive(Debug, Clone)]
pub struct IrisQuery<P> {
    /// `x * xmask`
    pub data_mask: PlainStrip<P>,
    /// `(1 - x) * xmask`
    pub complement_mask: PlainStrip<P>,
    /// `xmask`
    pub mask: PlainStrip<P>,
}

impl<P> IrisQuery<P> {
    pub fn pack(packer: &StripePacker, query: &PlainBio) -> Result<Self> {
        let mask = query
            .mask
            .as_ref()
            .ok_or_else(|| Error::layout("iris query without mask"))?;
        let data = packer.replicate::<P>(&query.data)?;
        let mask = packer.replicate::<P>(mask)?;
        Ok(Self {
            data_mask: data.multiply(&mask)?,
            complement_mask: data.logical_not().multiply(&mask)?,
            mask,
        })
    }
}

/// The three encrypted masked products kept per iris database strip. The raw
/// template is never encrypted on its own.
#[derive(Debug, Clone)]
pub struct IrisStripSet<C> {
    /// `ymask`
    pub mask: CipherStrip<C>,
    /// `y * ymask`
    pub template_mask: CipherStrip<C>,
    /// `(1 - y) * ymask`
    pub complement_mask: CipherStrip<C>,
}

impl<C> IrisStripSet<C> {
    /// Encrypts the masked products of a plaintext template strip and its
    /// mask strip.
    pub fn encrypt<H>(
        he: &H,
        data: &PlainStrip<H::Plaintext>,
        mask: &PlainStrip<H::Plaintext>,
    ) -> Result<Self>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        let template_mask = data.multiply(mask)?;
        let complement_mask = data.logical_not().multiply(mask)?;
        Ok(Self {
            mask: mask.encrypt(he)?,
            template_mask: template_mask.encrypt(he)?,
            complement_mask: complement_mask.encrypt(he)?,
        })
    }
}

/// Thresholded, division free Hamming score of every record of `working`
/// against the query: `100 * hamming - threshold * overlap`.
///
/// Decoded symmetrically, a negative score means the normalized Hamming
/// distance is below `threshold` percent.
pub fn normalized_hamming_distance<H: HeEvaluator>(
    he: &H,
    working: IrisStripSet<H::Ciphertext>,
    query: &IrisQuery<H::Plaintext>,
    threshold: u64,
) -> Result<H::Ciphertext> {
    let IrisStripSet {
        mut mask,
        mut template_mask,
        mut complement_mask,
    } = working;

    // y * ymask * (1 - x) * xmask counts the positions where only y is set.
    template_mask.mul_plain(he, &query.complement_mask)?;
    complement_mask.mul_plain(he, &query.data_mask)?;
    mask.mul_plain(he, &query.mask)?;

    let mut hamming = template_mask.stripe_sum(he)?;
    let other = complement_mask.stripe_sum(he)?;
    he.add(&mut hamming, &other)?;
    he.mul_scalar(&mut hamming, HAMMING_SCALE)?;

    let mut overlap = mask.stripe_sum(he)?;
    he.mul_scalar(&mut overlap, threshold)?;
    he.sub(&mut hamming, &overlap)?;
    Ok(hamming)
}
