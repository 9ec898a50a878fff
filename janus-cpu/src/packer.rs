use crate::strip::PlainStrip;
use janus_common::{
    error::{Error, Result},
    layout::LayoutParams,
};
use tracing::debug;

/// Number of leading slots shown by the verbose previews.
const PREVIEW_SLOTS: usize = 16;

/// Arranges plaintext records into stripe-packed [`PlainStrip`]s.
#[derive(Debug, Clone)]
pub struct StripePacker {
    layout: LayoutParams,
    verbose: bool,
}

impl StripePacker {
    pub fn new(layout: LayoutParams) -> Self {
        Self {
            layout,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn layout(&self) -> &LayoutParams {
        &self.layout
    }

    /// Packs consecutive chunks of `records_per_ciphertext` records into one
    /// strip each. The last strip is zero padded.
    pub fn pack<P, R: AsRef<[i64]>>(&self, records: &[R]) -> Result<Vec<PlainStrip<P>>> {
        let ts = self.layout.template_size();
        if let Some((idx, rec)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.as_ref().len() != ts)
        {
            return Err(Error::layout(format!(
                "record {idx}: templateSize ({}) != ctxPerTemplate ({}) * slotsPerCtx ({})",
                rec.as_ref().len(),
                self.layout.ctx_per_template(),
                self.layout.slots_per_ctx()
            )));
        }

        let ctx_per_template = self.layout.ctx_per_template();
        let slots_per_ctx = self.layout.slots_per_ctx();
        let ring_slots = self.layout.ring_slots();

        let strips: Vec<PlainStrip<P>> = records
            .chunks(self.layout.records_per_ciphertext())
            .map(|chunk| {
                let rows = (0..ctx_per_template)
                    .map(|i| {
                        let mut row = vec![0; ring_slots];
                        for (rec, record) in chunk.iter().enumerate() {
                            let src = &record.as_ref()[i * slots_per_ctx..(i + 1) * slots_per_ctx];
                            row[rec * slots_per_ctx..(rec + 1) * slots_per_ctx]
                                .copy_from_slice(src);
                        }
                        row
                    })
                    .collect();
                PlainStrip::from_rows(slots_per_ctx, chunk.len(), rows)
            })
            .collect();

        if self.verbose {
            for (i, rec) in records.iter().take(4).enumerate() {
                debug!(record = i, values = ?preview(rec.as_ref()), "Packing input");
            }
            if let Some(strip) = strips.first() {
                for (i, row) in strip.rows().iter().take(4).enumerate() {
                    debug!(strip = 0, row = i, values = ?preview(row), "Packed strip");
                }
            }
        }
        Ok(strips)
    }

    /// Packs `records_per_ciphertext` copies of `record` into a single strip,
    /// broadcasting a query against every position of a database strip.
    pub fn replicate<P>(&self, record: &[i64]) -> Result<PlainStrip<P>> {
        let copies = vec![record; self.layout.records_per_ciphertext()];
        let mut strips = self.pack(&copies)?;
        if strips.len() != 1 {
            return Err(Error::ReplicationOverflow {
                strips: strips.len(),
            });
        }
        Ok(strips.remove(0))
    }
}

fn preview(values: &[i64]) -> &[i64] {
    &values[..values.len().min(PREVIEW_SLOTS)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_common::bio::BiometricKind;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rstest::rstest;
    use tracing_test::traced_test;

    fn random_records(n: usize, ts: usize) -> Vec<Vec<i64>> {
        let mut rng = StdRng::seed_from_u64(n as u64);
        (0..n)
            .map(|_| (0..ts).map(|_| rng.gen_range(0..256)).collect())
            .collect()
    }

    #[rstest]
    #[case(16, 4, 64, 1)]
    #[case(16, 4, 64, 16)]
    #[case(16, 4, 64, 37)]
    #[case(2, 32, 64, 5)]
    #[case(64, 1, 64, 130)]
    fn pack_unpack_inverse(
        #[case] ctx: usize,
        #[case] slots: usize,
        #[case] ring: usize,
        #[case] n: usize,
    ) {
        let layout =
            LayoutParams::new(ctx * slots, ctx, slots, ring, n, 256, BiometricKind::Finger, 40)
                .unwrap();
        let records = random_records(n, ctx * slots);
        let strips = StripePacker::new(layout).pack::<(), _>(&records).unwrap();
        assert_eq!(strips.len(), layout.strip_count());
        for (k, record) in records.iter().enumerate() {
            let (strip, pos) = layout.locate(k);
            assert_eq!(&strips[strip].get_record(pos), record);
        }
        for strip in &strips {
            assert_eq!(strip.ctx_per_template(), ctx);
            assert!(strip.rows().iter().all(|row| row.len() == ring));
        }
    }

    #[test]
    fn last_strip_is_padded() {
        let layout = LayoutParams::new(8, 2, 4, 16, 5, 256, BiometricKind::Finger, 40).unwrap();
        let records = random_records(5, 8);
        let strips = StripePacker::new(layout).pack::<(), _>(&records).unwrap();
        assert_eq!(strips.len(), 2);
        assert_eq!(strips[1].record_count(), 1);
        assert!(strips[1].rows().iter().all(|row| row[4..].iter().all(|&v| v == 0)));
    }

    #[test]
    fn rejects_wrong_record_length() {
        let layout = LayoutParams::new(8, 2, 4, 16, 2, 256, BiometricKind::Finger, 40).unwrap();
        let records = vec![vec![0; 8], vec![0; 7]];
        let err = StripePacker::new(layout)
            .pack::<(), _>(&records)
            .unwrap_err();
        assert!(matches!(err, Error::LayoutMismatch(ref m) if m.contains("record 1")));
    }

    #[test]
    fn replicate_fills_every_position() {
        let layout = LayoutParams::new(8, 2, 4, 32, 1, 256, BiometricKind::Finger, 40).unwrap();
        let record = random_records(1, 8).remove(0);
        let strip = StripePacker::new(layout).replicate::<()>(&record).unwrap();
        assert_eq!(strip.record_count(), layout.records_per_ciphertext());
        for pos in 0..layout.records_per_ciphertext() {
            assert_eq!(strip.get_record(pos), record);
        }
    }

    #[test]
    fn replicate_checks_length() {
        let layout = LayoutParams::new(8, 2, 4, 32, 1, 256, BiometricKind::Finger, 40).unwrap();
        assert!(StripePacker::new(layout)
            .replicate::<()>(&[1, 2, 3])
            .is_err());
    }

    #[test]
    #[traced_test]
    fn verbose_previews() {
        let layout = LayoutParams::new(8, 2, 4, 16, 2, 256, BiometricKind::Finger, 40).unwrap();
        StripePacker::new(layout)
            .verbose(true)
            .pack::<(), _>(&random_records(2, 8))
            .unwrap();
        assert!(logs_contain("Packed strip"));
    }
}
