use crate::{
    error::{Error, Result},
    HAMMING_SCALE, IRIS_DOMAIN,
};
use itertools::izip;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Probability that a synthetic mask keeps a position visible.
pub const MASK_VISIBILITY: f64 = 0.85;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiometricKind {
    /// Integer templates compared with the squared Euclidean distance.
    #[default]
    Finger,
    /// Binary templates with occlusion masks compared with the normalized
    /// Hamming distance.
    Iris,
}

impl BiometricKind {
    pub fn has_mask(self) -> bool {
        matches!(self, BiometricKind::Iris)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BiometricKind::Finger => "finger",
            BiometricKind::Iris => "iris",
        }
    }
}

impl FromStr for BiometricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finger" => Ok(BiometricKind::Finger),
            "iris" => Ok(BiometricKind::Iris),
            _ => Err(Error::UnsupportedModality(s.to_string())),
        }
    }
}

impl fmt::Display for BiometricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plaintext biometric template. Values lie in `[0, domain)`; iris
/// templates carry a binary occlusion mask of the same length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainBio {
    pub data: Vec<i64>,
    pub mask: Option<Vec<i64>>,
}

impl PlainBio {
    pub fn new(data: Vec<i64>) -> Self {
        Self { data, mask: None }
    }

    pub fn with_mask(data: Vec<i64>, mask: Vec<i64>) -> Self {
        Self {
            data,
            mask: Some(mask),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn random_rng<R: Rng>(
        rng: &mut R,
        template_size: usize,
        domain: u64,
        has_mask: bool,
    ) -> Self {
        let data = (0..template_size)
            .map(|_| rng.gen_range(0..domain) as i64)
            .collect();
        let mask = has_mask.then(|| random_mask(rng, template_size));
        Self { data, mask }
    }

    /// Returns a template agreeing with `self` on roughly a `similarity`
    /// fraction of its positions. Disagreeing positions are mapped to
    /// `(1 - v) mod domain`, and a fresh mask is drawn when `self` has one.
    pub fn fake_match<R: Rng>(&self, rng: &mut R, similarity: f64, domain: u64) -> Self {
        let domain = domain as i64;
        let data = self
            .data
            .iter()
            .map(|&v| {
                if rng.gen::<f64>() > similarity {
                    (1 - v + domain).rem_euclid(domain)
                } else {
                    v
                }
            })
            .collect();
        let mask = self.mask.as_ref().map(|m| random_mask(rng, m.len()));
        Self { data, mask }
    }

    /// Elementwise product of both masks, or `None` when either side has no
    /// mask.
    pub fn merged_mask(&self, other: &Self) -> Option<Vec<i64>> {
        match (&self.mask, &other.mask) {
            (Some(a), Some(b)) => Some(a.iter().zip(b).map(|(x, y)| x * y).collect()),
            _ => None,
        }
    }

    /// Plaintext squared Euclidean distance, restricted to the common
    /// unmasked region when both templates carry masks.
    pub fn euclidean_distance(&self, other: &Self) -> u64 {
        match self.merged_mask(other) {
            Some(mask) => izip!(&self.data, &other.data, &mask)
                .map(|(a, b, m)| ((a - b) * m).pow(2) as u64)
                .sum(),
            None => self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).pow(2) as u64)
                .sum(),
        }
    }

    /// Returns the Hamming distance over the common unmasked region together
    /// with the size of that region.
    pub fn hamming_fraction(&self, other: &Self) -> (u64, u64) {
        let mask = self
            .merged_mask(other)
            .unwrap_or_else(|| vec![1; self.data.len()]);
        let mut distance = 0;
        let mut mask_len = 0;
        for (a, b, m) in izip!(&self.data, &other.data, &mask) {
            mask_len += *m as u64;
            distance += ((a ^ b) * m) as u64;
        }
        (distance, mask_len)
    }

    /// Plaintext counterpart of the encrypted iris score:
    /// `100 * hamming - threshold * mask_len`.
    pub fn hamming_score(&self, other: &Self, threshold: u64) -> i64 {
        let (distance, mask_len) = self.hamming_fraction(other);
        (HAMMING_SCALE * distance) as i64 - (threshold * mask_len) as i64
    }

    pub fn is_close_hamming(&self, other: &Self, threshold: u64) -> bool {
        self.hamming_score(other, threshold) < 0
    }

    /// Checks values against the domain and, for iris templates, the
    /// presence and binarity of the mask.
    pub fn validate(&self, kind: BiometricKind, template_size: usize, domain: u64) -> Result<()> {
        if self.data.len() != template_size {
            return Err(Error::layout(format!(
                "record length {} != templateSize {}",
                self.data.len(),
                template_size
            )));
        }
        if let Some(v) = self.data.iter().find(|&&v| v < 0 || v as u64 >= domain) {
            return Err(Error::layout(format!(
                "template value {v} outside of domain [0, {domain})"
            )));
        }
        if kind.has_mask() {
            let mask = self
                .mask
                .as_ref()
                .ok_or_else(|| Error::layout("iris record without mask"))?;
            if mask.len() != template_size {
                return Err(Error::layout(format!(
                    "mask length {} != templateSize {}",
                    mask.len(),
                    template_size
                )));
            }
            if mask.iter().any(|&m| m as u64 >= IRIS_DOMAIN || m < 0) {
                return Err(Error::layout("iris mask is not binary"));
            }
        }
        Ok(())
    }
}

fn random_mask<R: Rng>(rng: &mut R, len: usize) -> Vec<i64> {
    (0..len)
        .map(|_| rng.gen_bool(MASK_VISIBILITY) as i64)
        .collect()
}
