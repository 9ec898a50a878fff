use crate::{
    bio::BiometricKind,
    layout::LayoutParams,
    EUCLIDEAN_THRESHOLD, MATCH_THRESHOLD,
};
use clap::Parser;
use eyre::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Parser)]
pub struct Opt {
    /// Number of enrolled templates.
    #[arg(short = 'n', long)]
    db_size: Option<usize>,

    /// Size of each biometric template.
    #[arg(long)]
    template_size: Option<usize>,

    /// Domain of template values.
    #[arg(short = 'd', long)]
    domain: Option<u64>,

    /// Biometric modality, one of [finger, iris].
    #[arg(long)]
    biometric_kind: Option<String>,

    /// Number of ciphertexts per template strip.
    #[arg(long)]
    ctx_per_template: Option<usize>,

    /// Number of batched slots per ciphertext and template.
    #[arg(long)]
    slots_per_ctx: Option<usize>,

    /// Number of fused templates per enrolled user.
    #[arg(long)]
    templates_per_user: Option<usize>,

    /// Worker threads, 0 picks the rayon default.
    #[arg(long)]
    num_threads: Option<usize>,

    /// Ring dimension N of the BFV scheme.
    #[arg(long)]
    ring_slots: Option<usize>,

    /// Plaintext modulus t, decimal or 0x-prefixed hex.
    #[arg(long, value_parser = parse_modulus)]
    plain_modulus: Option<u64>,

    /// Multiplicative depth the modulus chain must support.
    #[arg(long)]
    max_depth: Option<u32>,

    /// Iris acceptance threshold in percentage points.
    #[arg(long)]
    match_threshold: Option<u64>,

    /// Fingerprint acceptance threshold on the squared distance.
    #[arg(long)]
    euclidean_threshold: Option<u64>,

    #[arg(long)]
    verbose: bool,
}

fn parse_modulus(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_size")]
    pub db_size: usize,

    #[serde(default = "default_template_size")]
    pub template_size: usize,

    #[serde(default = "default_domain")]
    pub domain: u64,

    #[serde(default = "default_biometric_kind")]
    pub biometric_kind: String,

    #[serde(default = "default_ctx_per_template")]
    pub ctx_per_template: usize,

    #[serde(default = "default_slots_per_ctx")]
    pub slots_per_ctx: usize,

    /// Number of SIMD slots of the HE scheme (its ring dimension N).
    #[serde(default = "default_ring_slots")]
    pub ring_slots: usize,

    #[serde(default = "default_plain_modulus")]
    pub plain_modulus: u64,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Iris acceptance threshold in percentage points of the normalized
    /// Hamming distance.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: u64,

    #[serde(default = "default_euclidean_threshold")]
    pub euclidean_threshold: u64,

    #[serde(default = "default_templates_per_user")]
    pub templates_per_user: usize,

    #[serde(default)]
    pub num_threads: usize,

    /// Logs previews of packed strips and decoded slots at debug level.
    #[serde(default)]
    pub verbose: bool,
}

fn default_db_size() -> usize {
    100
}

fn default_template_size() -> usize {
    64
}

fn default_domain() -> u64 {
    256
}

fn default_biometric_kind() -> String {
    BiometricKind::Finger.to_string()
}

fn default_ctx_per_template() -> usize {
    16
}

fn default_slots_per_ctx() -> usize {
    4
}

fn default_ring_slots() -> usize {
    4096
}

fn default_plain_modulus() -> u64 {
    0x3ee0001
}

fn default_max_depth() -> u32 {
    2
}

fn default_match_threshold() -> u64 {
    MATCH_THRESHOLD
}

fn default_euclidean_threshold() -> u64 {
    EUCLIDEAN_THRESHOLD
}

fn default_templates_per_user() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_size: default_db_size(),
            template_size: default_template_size(),
            domain: default_domain(),
            biometric_kind: default_biometric_kind(),
            ctx_per_template: default_ctx_per_template(),
            slots_per_ctx: default_slots_per_ctx(),
            ring_slots: default_ring_slots(),
            plain_modulus: default_plain_modulus(),
            max_depth: default_max_depth(),
            match_threshold: default_match_threshold(),
            euclidean_threshold: default_euclidean_threshold(),
            templates_per_user: default_templates_per_user(),
            num_threads: 0,
            verbose: false,
        }
    }
}

impl Config {
    pub fn load_config(prefix: &str) -> Result<Config> {
        let settings = config::Config::builder();
        let settings = settings
            .add_source(
                config::Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize::<Config>()?;
        Ok(config)
    }

    pub fn overwrite_defaults_with_cli_args(&mut self, opts: Opt) {
        if let Some(db_size) = opts.db_size {
            self.db_size = db_size;
        }
        if let Some(template_size) = opts.template_size {
            self.template_size = template_size;
        }
        if let Some(domain) = opts.domain {
            self.domain = domain;
        }
        if let Some(biometric_kind) = opts.biometric_kind {
            self.biometric_kind = biometric_kind;
        }
        if let Some(ctx_per_template) = opts.ctx_per_template {
            self.ctx_per_template = ctx_per_template;
        }
        if let Some(slots_per_ctx) = opts.slots_per_ctx {
            self.slots_per_ctx = slots_per_ctx;
        }
        if let Some(templates_per_user) = opts.templates_per_user {
            self.templates_per_user = templates_per_user;
        }
        if let Some(num_threads) = opts.num_threads {
            self.num_threads = num_threads;
        }
        if let Some(ring_slots) = opts.ring_slots {
            self.ring_slots = ring_slots;
        }
        if let Some(plain_modulus) = opts.plain_modulus {
            self.plain_modulus = plain_modulus;
        }
        if let Some(max_depth) = opts.max_depth {
            self.max_depth = max_depth;
        }
        if let Some(match_threshold) = opts.match_threshold {
            self.match_threshold = match_threshold;
        }
        if let Some(euclidean_threshold) = opts.euclidean_threshold {
            self.euclidean_threshold = euclidean_threshold;
        }
        self.verbose |= opts.verbose;
    }

    pub fn kind(&self) -> crate::Result<BiometricKind> {
        self.biometric_kind.parse()
    }

    /// Validates the packing geometry and parses the modality.
    pub fn layout(&self) -> crate::Result<LayoutParams> {
        LayoutParams::new(
            self.template_size,
            self.ctx_per_template,
            self.slots_per_ctx,
            self.ring_slots,
            self.db_size,
            self.domain,
            self.kind()?,
            self.match_threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn defaults_form_a_valid_layout() {
        let config = Config::default();
        let layout = config.layout().unwrap();
        assert_eq!(layout.kind(), BiometricKind::Finger);
        assert_eq!(layout.records_per_ciphertext(), 1024);
        layout.check_headroom(config.plain_modulus).unwrap();
    }

    #[test]
    fn cli_overrides() {
        let mut config = Config::default();
        let opts = Opt::parse_from([
            "janus",
            "--biometric-kind",
            "iris",
            "-d",
            "2",
            "--template-size",
            "128",
            "--ctx-per-template",
            "32",
            "--verbose",
        ]);
        config.overwrite_defaults_with_cli_args(opts);
        assert_eq!(config.kind().unwrap(), BiometricKind::Iris);
        assert!(config.verbose);
        assert_eq!(config.layout().unwrap().template_size(), 128);
    }

    #[test]
    fn cli_overrides_scheme_and_thresholds() {
        let mut config = Config::default();
        let opts = Opt::try_parse_from([
            "janus",
            "--ring-slots",
            "8192",
            "--plain-modulus",
            "0x3ee0001",
            "--max-depth",
            "3",
            "--match-threshold",
            "30",
            "--euclidean-threshold",
            "5000",
        ])
        .unwrap();
        config.overwrite_defaults_with_cli_args(opts);
        assert_eq!(config.ring_slots, 8192);
        assert_eq!(config.plain_modulus, 0x3ee0001);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.match_threshold, 30);
        assert_eq!(config.euclidean_threshold, 5000);
        assert_eq!(config.layout().unwrap().records_per_ciphertext(), 2048);

        let opts = Opt::try_parse_from(["janus", "--plain-modulus", "65537"]).unwrap();
        config.overwrite_defaults_with_cli_args(opts);
        assert_eq!(config.plain_modulus, 65537);
        assert!(Opt::try_parse_from(["janus", "--plain-modulus", "0xzz"]).is_err());
    }

    #[test]
    fn unknown_modality() {
        let config = Config {
            biometric_kind: "palm".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.layout(),
            Err(Error::UnsupportedModality(_))
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"db_size": 7, "biometric_kind": "iris"}"#).unwrap();
        assert_eq!(config.db_size, 7);
        assert_eq!(config.template_size, 64);
        assert_eq!(config.match_threshold, MATCH_THRESHOLD);
    }
}
