//! Packing geometry for stripe-packed templates.
//!
//! A template of `template_size` values is viewed as a
//! `ctx_per_template x slots_per_ctx` matrix. Row `i` of every template in a
//! batch goes to ciphertext `i` of a strip, and each template owns the
//! `slots_per_ctx` consecutive slots starting at `rec * slots_per_ctx`. A
//! strip therefore holds `ring_slots / slots_per_ctx` templates.
//!
//! Small `slots_per_ctx` values trade rotations (needed by the inner sum) for
//! more ciphertexts and additions, which are the cheap operations of BFV.
use crate::{
    bio::BiometricKind,
    error::{Error, Result},
    HAMMING_SCALE, IRIS_DOMAIN,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutParams {
    template_size: usize,
    ctx_per_template: usize,
    slots_per_ctx: usize,
    ring_slots: usize,
    db_size: usize,
    domain: u64,
    kind: BiometricKind,
    match_threshold: u64,
}

impl LayoutParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        template_size: usize,
        ctx_per_template: usize,
        slots_per_ctx: usize,
        ring_slots: usize,
        db_size: usize,
        domain: u64,
        kind: BiometricKind,
        match_threshold: u64,
    ) -> Result<Self> {
        if ctx_per_template == 0 || slots_per_ctx == 0 {
            return Err(Error::layout(format!(
                "ctxPerTemplate ({ctx_per_template}) and slotsPerCtx ({slots_per_ctx}) must be positive"
            )));
        }
        if template_size != ctx_per_template * slots_per_ctx {
            return Err(Error::layout(format!(
                "templateSize ({template_size}) != ctxPerTemplate ({ctx_per_template}) * slotsPerCtx ({slots_per_ctx})"
            )));
        }
        if !ring_slots.is_power_of_two() || ring_slots < 2 {
            return Err(Error::layout(format!(
                "ringSlots ({ring_slots}) must be a power of two"
            )));
        }
        if !slots_per_ctx.is_power_of_two() {
            return Err(Error::layout(format!(
                "slotsPerCtx ({slots_per_ctx}) must be a power of two"
            )));
        }
        if slots_per_ctx > ring_slots / 2 {
            return Err(Error::layout(format!(
                "slotsPerCtx ({slots_per_ctx}) > ringSlots/2 ({})",
                ring_slots / 2
            )));
        }
        if domain < 2 {
            return Err(Error::layout(format!("domain ({domain}) must be at least 2")));
        }
        if kind == BiometricKind::Iris && domain != IRIS_DOMAIN {
            return Err(Error::layout(format!(
                "iris templates are binary, got domain {domain}"
            )));
        }
        if match_threshold > HAMMING_SCALE {
            return Err(Error::layout(format!(
                "matchThreshold ({match_threshold}) exceeds {HAMMING_SCALE} percentage points"
            )));
        }

        Ok(Self {
            template_size,
            ctx_per_template,
            slots_per_ctx,
            ring_slots,
            db_size,
            domain,
            kind,
            match_threshold,
        })
    }

    pub fn template_size(&self) -> usize {
        self.template_size
    }

    pub fn ctx_per_template(&self) -> usize {
        self.ctx_per_template
    }

    pub fn slots_per_ctx(&self) -> usize {
        self.slots_per_ctx
    }

    pub fn ring_slots(&self) -> usize {
        self.ring_slots
    }

    pub fn db_size(&self) -> usize {
        self.db_size
    }

    pub fn domain(&self) -> u64 {
        self.domain
    }

    pub fn kind(&self) -> BiometricKind {
        self.kind
    }

    pub fn has_mask(&self) -> bool {
        self.kind.has_mask()
    }

    pub fn match_threshold(&self) -> u64 {
        self.match_threshold
    }

    pub fn records_per_ciphertext(&self) -> usize {
        self.ring_slots / self.slots_per_ctx
    }

    pub fn strip_count(&self) -> usize {
        self.strips_for(self.db_size)
    }

    pub fn strips_for(&self, records: usize) -> usize {
        records.div_ceil(self.records_per_ciphertext())
    }

    /// Strip index and in-strip position of record `k`.
    pub fn locate(&self, k: usize) -> (usize, usize) {
        let per = self.records_per_ciphertext();
        (k / per, k % per)
    }

    /// Largest value a result slot can take before it is read back.
    ///
    /// Euclidean distances are non-negative and use the whole modulus. Iris
    /// scores are read symmetrically, so both `100 * templateSize` and
    /// `threshold * templateSize` must stay below half of it; the returned
    /// value is doubled accordingly.
    pub fn required_headroom(&self) -> u128 {
        let ts = self.template_size as u128;
        match self.kind {
            BiometricKind::Finger => {
                let max = (self.domain - 1) as u128;
                ts * max * max
            }
            BiometricKind::Iris => {
                2 * ts * HAMMING_SCALE.max(self.match_threshold) as u128
            }
        }
    }

    pub fn check_headroom(&self, plain_modulus: u64) -> Result<()> {
        let required = self.required_headroom();
        if required >= plain_modulus as u128 {
            return Err(Error::InsufficientHeadroom {
                required,
                available: plain_modulus,
            });
        }
        Ok(())
    }

    /// Checks that the HE provider batches as many slots as the layout
    /// assumes.
    pub fn check_ring_slots(&self, provider_slots: usize) -> Result<()> {
        if provider_slots != self.ring_slots {
            return Err(Error::layout(format!(
                "ringSlots ({}) != provider slot count ({provider_slots})",
                self.ring_slots
            )));
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        format!(
            "DB[{}] {} templates of size {} (domain {}), strips of {} x {} slots",
            self.db_size,
            self.kind,
            self.template_size,
            self.domain,
            self.ctx_per_template,
            self.slots_per_ctx
        )
    }
}
