use crate::protocol::randomizer::internal_slot_randomizer;
use janus_common::{
    error::{Error, Result},
    he::{HeEvaluator, HeResult},
};
use std::sync::OnceLock;

/// Up to `ring_slots / slots_per_ctx` templates laid out across
/// `ctx_per_template` rows of `ring_slots` values each.
///
/// Row `i`, slot `rec * slots_per_ctx + j` holds value `i * slots_per_ctx + j`
/// of record `rec`. Slots past the last packed record are zero.
///
/// The encoded plaintexts of the rows are built on first use and cached until
/// the numeric content changes.
#[derive(Debug, Clone)]
pub struct PlainStrip<P> {
    slots_per_ctx: usize,
    records: usize,
    rows: Vec<Vec<i64>>,
    encoded: OnceLock<Vec<P>>,
}

impl<P> PlainStrip<P> {
    pub(crate) fn from_rows(slots_per_ctx: usize, records: usize, rows: Vec<Vec<i64>>) -> Self {
        Self {
            slots_per_ctx,
            records,
            rows,
            encoded: OnceLock::new(),
        }
    }

    pub fn ctx_per_template(&self) -> usize {
        self.rows.len()
    }

    pub fn slots_per_ctx(&self) -> usize {
        self.slots_per_ctx
    }

    /// Width of every row.
    pub fn ring_slots(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn records_per_ciphertext(&self) -> usize {
        self.ring_slots() / self.slots_per_ctx
    }

    /// Number of real records packed into this strip.
    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn rows(&self) -> &[Vec<i64>] {
        &self.rows
    }

    /// Mutable access to the rows. Drops the encoded plaintext cache.
    pub fn rows_mut(&mut self) -> &mut [Vec<i64>] {
        self.encoded.take();
        &mut self.rows
    }

    /// Overwrites a single slot. Drops the encoded plaintext cache.
    pub fn set(&mut self, row: usize, slot: usize, value: i64) {
        self.encoded.take();
        self.rows[row][slot] = value;
    }

    pub fn is_encoded(&self) -> bool {
        self.encoded.get().is_some()
    }

    /// Returns the template stored at position `idx` of the strip.
    pub fn get_record(&self, idx: usize) -> Vec<i64> {
        let start = idx * self.slots_per_ctx;
        self.rows
            .iter()
            .flat_map(|row| row[start..start + self.slots_per_ctx].iter().copied())
            .collect()
    }

    /// Per-slot `1 - v`, the complement of binary templates.
    pub fn logical_not(&self) -> Self {
        self.map(|v| 1 - v)
    }

    /// Slotwise product of two strips of the same shape.
    pub fn multiply(&self, other: &Self) -> Result<Self> {
        if self.rows.len() != other.rows.len()
            || self.ring_slots() != other.ring_slots()
            || self.slots_per_ctx != other.slots_per_ctx
        {
            return Err(Error::layout(format!(
                "cannot multiply strips of shape {}x{} and {}x{}",
                self.rows.len(),
                self.ring_slots(),
                other.rows.len(),
                other.ring_slots()
            )));
        }
        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| a.iter().zip(b).map(|(x, y)| x * y).collect())
            .collect();
        Ok(Self::from_rows(
            self.slots_per_ctx,
            self.records.max(other.records),
            rows,
        ))
    }

    fn map(&self, f: impl Fn(i64) -> i64) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(|&v| f(v)).collect())
            .collect();
        Self::from_rows(self.slots_per_ctx, self.records, rows)
    }

    /// Encoded plaintexts of the rows, built on first use.
    pub fn encoded<H>(&self, he: &H) -> Result<&[P]>
    where
        H: HeEvaluator<Plaintext = P>,
    {
        if let Some(pts) = self.encoded.get() {
            return Ok(pts.as_slice());
        }
        let pts = self
            .rows
            .iter()
            .map(|row| he.encode(row))
            .collect::<HeResult<Vec<_>>>()?;
        Ok(self.encoded.get_or_init(|| pts).as_slice())
    }

    pub fn encrypt<H>(&self, he: &H) -> Result<CipherStrip<H::Ciphertext>>
    where
        H: HeEvaluator<Plaintext = P>,
    {
        let rows = self
            .encoded(he)?
            .iter()
            .map(|pt| he.encrypt(pt))
            .collect::<HeResult<Vec<_>>>()?;
        Ok(CipherStrip {
            slots_per_ctx: self.slots_per_ctx,
            rows,
        })
    }
}

/// The encrypted counterpart of a [`PlainStrip`]: one ciphertext per row,
/// with the same slot semantics.
///
/// Arithmetic is destructive on the rows. Stored strips are cloned into a
/// working copy before any query touches them.
#[derive(Debug, Clone)]
pub struct CipherStrip<C> {
    slots_per_ctx: usize,
    rows: Vec<C>,
}

impl<C> CipherStrip<C> {
    pub fn ctx_per_template(&self) -> usize {
        self.rows.len()
    }

    pub fn slots_per_ctx(&self) -> usize {
        self.slots_per_ctx
    }

    pub fn rows(&self) -> &[C] {
        &self.rows
    }

    fn check_shape<P>(&self, plain: &PlainStrip<P>) -> Result<()> {
        if self.rows.len() != plain.ctx_per_template() || self.slots_per_ctx != plain.slots_per_ctx
        {
            return Err(Error::layout(format!(
                "ciphertext strip ({} rows, {} slots per ctx) and plaintext strip ({} rows, {} slots per ctx) differ",
                self.rows.len(),
                self.slots_per_ctx,
                plain.ctx_per_template(),
                plain.slots_per_ctx
            )));
        }
        Ok(())
    }

    /// Row-wise ciphertext minus plaintext.
    pub fn sub_plain<H>(&mut self, he: &H, plain: &PlainStrip<H::Plaintext>) -> Result<()>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        self.check_shape(plain)?;
        for (ct, pt) in self.rows.iter_mut().zip(plain.encoded(he)?) {
            he.sub_plain(ct, pt)?;
        }
        Ok(())
    }

    /// Row-wise ciphertext times plaintext.
    pub fn mul_plain<H>(&mut self, he: &H, plain: &PlainStrip<H::Plaintext>) -> Result<()>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        self.check_shape(plain)?;
        for (ct, pt) in self.rows.iter_mut().zip(plain.encoded(he)?) {
            he.mul_plain(ct, pt)?;
        }
        Ok(())
    }

    /// Squares every row and relinearizes the products.
    pub fn square<H>(&mut self, he: &H) -> Result<()>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        for ct in self.rows.iter_mut() {
            let mut sq = he.mul(ct, ct)?;
            he.relinearize(&mut sq)?;
            *ct = sq;
        }
        Ok(())
    }

    /// Sums all values of every template into its first slot.
    ///
    /// The rows are added pairwise down to a single ciphertext, then an inner
    /// sum folds the `slots_per_ctx` partial sums. Slots that are not a
    /// multiple of `slots_per_ctx` hold partial sums afterwards, which get
    /// masked with fresh uniform noise.
    pub fn stripe_sum<H>(self, he: &H) -> Result<C>
    where
        H: HeEvaluator<Ciphertext = C>,
    {
        let slots_per_ctx = self.slots_per_ctx;
        let mut level = self.rows;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut iter = level.into_iter();
            while let Some(mut lhs) = iter.next() {
                if let Some(rhs) = iter.next() {
                    he.add(&mut lhs, &rhs)?;
                }
                next.push(lhs);
            }
            level = next;
        }
        let mut sum = level
            .pop()
            .ok_or_else(|| Error::layout("cannot sum an empty strip"))?;

        he.inner_sum(&mut sum, 1, slots_per_ctx)?;

        let noise = internal_slot_randomizer(he, slots_per_ctx)?;
        he.add_plain(&mut sum, &noise)?;
        Ok(sum)
    }
}
