//! Preview option resolution
//!
//! The host hands over an already-parsed option mapping ([`RawOptions`]).
//! [`Settings::resolve`] validates every value once at startup and produces
//! the immutable [`Settings`] the rest of the crate reads.

use crate::{PreviewError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Default bound applied to both preview axes
pub const DEFAULT_MAX_SIZE: u32 = 768;

/// Default number of batch items shown in one preview
pub const DEFAULT_MAX_BATCH: usize = 4;

/// Default number of columns in the preview grid
pub const DEFAULT_MAX_BATCH_COLS: usize = 2;

/// Default minimum interval between previews, in seconds
pub const DEFAULT_THROTTLE_SECS: f64 = 2.0;

/// Options for a compiled previewer variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Compilation mode (e.g. "reduce-overhead")
    pub mode: Option<String>,
    /// Compiler backend
    pub backend: Option<String>,
    /// Require a single graph
    pub fullgraph: Option<bool>,
    /// Allow dynamic shapes
    pub dynamic: Option<bool>,
}

impl CompileOptions {
    fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.backend.is_none()
            && self.fullgraph.is_none()
            && self.dynamic.is_none()
    }
}

/// Whether the primary decoder should run a compiled variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompileSetting {
    /// Run the decoder as-is
    #[default]
    Disabled,
    /// Compile with backend defaults
    Enabled,
    /// Compile with explicit options
    Custom(CompileOptions),
}

impl CompileSetting {
    /// Whether any compilation is requested
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CompileSetting::Disabled)
    }

    /// Explicit options, if any
    pub fn options(&self) -> Option<&CompileOptions> {
        match self {
            CompileSetting::Custom(opts) => Some(opts),
            _ => None,
        }
    }
}

/// How many decoder upscale stages to bypass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipPolicy {
    /// Skip exactly this many stages (clamped to the decoder)
    Fixed(u32),
    /// Skip only what keeps the output at or above the preview size
    Conservative,
    /// Skip down to a usability floor below the preview size
    Aggressive,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        SkipPolicy::Fixed(0)
    }
}

impl SkipPolicy {
    /// Map a raw directive; `-1` and `-2` select the auto policies.
    pub fn from_directive(directive: i64) -> Result<Self> {
        match directive {
            -1 => Ok(SkipPolicy::Conservative),
            -2 => Ok(SkipPolicy::Aggressive),
            n if n >= 0 => u32::try_from(n).map(SkipPolicy::Fixed).map_err(|_| {
                PreviewError::config("skip_upscale_layers", format!("{n} is too large"))
            }),
            n => Err(PreviewError::config(
                "skip_upscale_layers",
                format!("expected >= 0, -1 (conservative) or -2 (aggressive), got {n}"),
            )),
        }
    }
}

/// Strategy used when the primary decoder runs out of memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OomFallback {
    /// No fallback, the cycle produces no preview
    None,
    /// Cheap linear latent-to-RGB projection
    #[default]
    Latent2Rgb,
}

impl std::str::FromStr for OomFallback {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(OomFallback::None),
            "latent2rgb" => Ok(OomFallback::Latent2Rgb),
            other => Err(PreviewError::config(
                "oom_fallback",
                format!("unknown value '{other}', expected 'none' or 'latent2rgb'"),
            )),
        }
    }
}

/// Raw compile value: a flag or an options record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCompile {
    /// `true` / `false`
    Flag(bool),
    /// Options record
    Options(CompileOptions),
}

/// Option mapping as loaded by the host, before validation
///
/// Every key is optional. Numbers are signed so that out-of-domain values
/// reach [`Settings::resolve`] instead of failing deserialization. Keys may
/// carry the `btp_` prefix used by the host's settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    #[serde(alias = "btp_enabled")]
    pub enabled: Option<bool>,
    #[serde(alias = "btp_max_size")]
    pub max_size: Option<i64>,
    #[serde(alias = "btp_max_width")]
    pub max_width: Option<i64>,
    #[serde(alias = "btp_max_height")]
    pub max_height: Option<i64>,
    #[serde(alias = "btp_max_batch")]
    pub max_batch: Option<i64>,
    #[serde(alias = "btp_max_batch_cols")]
    pub max_batch_cols: Option<i64>,
    #[serde(alias = "btp_throttle_secs")]
    pub throttle_secs: Option<f64>,
    #[serde(alias = "btp_maxed_batch_step_mode")]
    pub maxed_batch_step_mode: Option<bool>,
    #[serde(alias = "btp_preview_device")]
    pub preview_device: Option<String>,
    #[serde(alias = "btp_skip_upscale_layers")]
    pub skip_upscale_layers: Option<i64>,
    #[serde(alias = "btp_compile_previewer")]
    pub compile_previewer: Option<RawCompile>,
    #[serde(alias = "btp_oom_fallback")]
    pub oom_fallback: Option<String>,
    #[serde(alias = "btp_oom_retry")]
    pub oom_retry: Option<bool>,
}

impl RawOptions {
    /// Parse from a JSON object
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse from an already-loaded mapping
    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

/// Validated, immutable preview settings
///
/// Only produced by [`Settings::resolve`]; deserializing goes through the
/// same validation via [`RawOptions`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOptions")]
pub struct Settings {
    enabled: bool,
    max_width: u32,
    max_height: u32,
    max_batch: usize,
    max_batch_cols: usize,
    throttle: Duration,
    maxed_batch_step_mode: bool,
    preview_device: Option<String>,
    skip_upscale_layers: SkipPolicy,
    compile_previewer: CompileSetting,
    oom_fallback: OomFallback,
    oom_retry: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_width: DEFAULT_MAX_SIZE,
            max_height: DEFAULT_MAX_SIZE,
            max_batch: DEFAULT_MAX_BATCH,
            max_batch_cols: DEFAULT_MAX_BATCH_COLS,
            throttle: Duration::from_secs_f64(DEFAULT_THROTTLE_SECS),
            maxed_batch_step_mode: false,
            preview_device: None,
            skip_upscale_layers: SkipPolicy::default(),
            compile_previewer: CompileSetting::Disabled,
            oom_fallback: OomFallback::default(),
            oom_retry: true,
        }
    }
}

impl TryFrom<RawOptions> for Settings {
    type Error = PreviewError;

    fn try_from(raw: RawOptions) -> Result<Self> {
        Self::resolve(raw)
    }
}

impl Settings {
    /// Validate a raw mapping into settings
    pub fn resolve(raw: RawOptions) -> Result<Self> {
        let defaults = Self::default();

        let max_size = match raw.max_size {
            Some(v) => positive_u32("max_size", v)?,
            None => DEFAULT_MAX_SIZE,
        };
        let max_width = match raw.max_width {
            Some(v) => positive_u32("max_width", v)?,
            None => max_size,
        };
        let max_height = match raw.max_height {
            Some(v) => positive_u32("max_height", v)?,
            None => max_size,
        };

        let max_batch = match raw.max_batch {
            Some(v) => at_least_one("max_batch", v)?,
            None => defaults.max_batch,
        };
        let max_batch_cols = match raw.max_batch_cols {
            Some(v) => at_least_one("max_batch_cols", v)?,
            None => defaults.max_batch_cols,
        };

        let throttle = match raw.throttle_secs {
            Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
                PreviewError::config(
                    "throttle_secs",
                    format!("must be a finite number of seconds >= 0, got {secs}"),
                )
            })?,
            None => defaults.throttle,
        };

        let preview_device = raw
            .preview_device
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let skip_upscale_layers = match raw.skip_upscale_layers {
            Some(v) => SkipPolicy::from_directive(v)?,
            None => defaults.skip_upscale_layers,
        };

        let compile_previewer = match raw.compile_previewer {
            None | Some(RawCompile::Flag(false)) => CompileSetting::Disabled,
            Some(RawCompile::Flag(true)) => CompileSetting::Enabled,
            Some(RawCompile::Options(opts)) if opts.is_empty() => CompileSetting::Enabled,
            Some(RawCompile::Options(opts)) => CompileSetting::Custom(opts),
        };

        let oom_fallback = match raw.oom_fallback {
            Some(s) => s.parse()?,
            None => defaults.oom_fallback,
        };

        let settings = Self {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            max_width,
            max_height,
            max_batch,
            max_batch_cols,
            throttle,
            maxed_batch_step_mode: raw
                .maxed_batch_step_mode
                .unwrap_or(defaults.maxed_batch_step_mode),
            preview_device,
            skip_upscale_layers,
            compile_previewer,
            oom_fallback,
            oom_retry: raw.oom_retry.unwrap_or(defaults.oom_retry),
        };

        info!(
            enabled = settings.enabled,
            max_width = settings.max_width,
            max_height = settings.max_height,
            max_batch = settings.max_batch,
            throttle_ms = settings.throttle.as_millis() as u64,
            "Resolved preview settings"
        );

        Ok(settings)
    }

    /// Resolve straight from a JSON object
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::resolve(RawOptions::from_json_str(json)?)
    }

    /// Use this previewer at all
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Maximum composite width in pixels
    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    /// Maximum composite height in pixels
    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Bounding size of the composite preview
    pub fn target_size(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    /// Maximum number of batch items shown
    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Maximum grid columns
    pub fn max_batch_cols(&self) -> usize {
        self.max_batch_cols
    }

    /// Minimum interval between previews
    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Spread selection over the whole batch instead of taking a prefix
    pub fn maxed_batch_step_mode(&self) -> bool {
        self.maxed_batch_step_mode
    }

    /// Device override for the decoder
    pub fn preview_device(&self) -> Option<&str> {
        self.preview_device.as_deref()
    }

    /// Upscale stage skipping
    pub fn skip_upscale_layers(&self) -> SkipPolicy {
        self.skip_upscale_layers
    }

    /// Compiled decoder variant
    pub fn compile_previewer(&self) -> &CompileSetting {
        &self.compile_previewer
    }

    /// Fallback on out-of-memory
    pub fn oom_fallback(&self) -> OomFallback {
        self.oom_fallback
    }

    /// Keep trying the primary decoder after an out-of-memory failure
    pub fn oom_retry(&self) -> bool {
        self.oom_retry
    }
}

fn positive_u32(key: &'static str, value: i64) -> Result<u32> {
    if value <= 0 {
        return Err(PreviewError::config(key, format!("must be > 0, got {value}")));
    }
    u32::try_from(value).map_err(|_| PreviewError::config(key, format!("{value} is too large")))
}

fn at_least_one(key: &'static str, value: i64) -> Result<usize> {
    if value < 1 {
        return Err(PreviewError::config(key, format!("must be >= 1, got {value}")));
    }
    usize::try_from(value).map_err(|_| PreviewError::config(key, format!("{value} is too large")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mapping_matches_defaults() {
        let settings = Settings::resolve(RawOptions::default()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.target_size(), (768, 768));
        assert_eq!(settings.throttle(), Duration::from_secs(2));
        assert_eq!(settings.oom_fallback, OomFallback::Latent2Rgb);
        assert!(settings.oom_retry);
    }

    #[test]
    fn test_max_size_applies_to_both_axes() {
        let settings = Settings::from_json_str(r#"{"max_size": 768}"#).unwrap();
        assert_eq!(settings.target_size(), (768, 768));

        let settings = Settings::from_json_str(r#"{"max_size": 1024}"#).unwrap();
        assert_eq!(settings.target_size(), (1024, 1024));
    }

    #[test]
    fn test_explicit_axis_overrides_max_size() {
        let settings = Settings::from_json_str(r#"{"max_size": 768, "max_width": 512}"#).unwrap();
        assert_eq!(settings.target_size(), (512, 768));

        let settings =
            Settings::from_json_str(r#"{"max_size": 768, "max_height": 300, "max_width": 400}"#)
                .unwrap();
        assert_eq!(settings.target_size(), (400, 300));
    }

    #[test]
    fn test_prefixed_keys() {
        let settings = Settings::from_json_str(
            r#"{"btp_max_size": 640, "btp_max_batch": 8, "btp_oom_fallback": "none"}"#,
        )
        .unwrap();
        assert_eq!(settings.target_size(), (640, 640));
        assert_eq!(settings.max_batch, 8);
        assert_eq!(settings.oom_fallback, OomFallback::None);
    }

    #[test]
    fn test_rejects_out_of_domain_values() {
        let cases = [
            (r#"{"max_batch": -1}"#, "max_batch"),
            (r#"{"max_batch": 0}"#, "max_batch"),
            (r#"{"max_batch_cols": 0}"#, "max_batch_cols"),
            (r#"{"max_size": 0}"#, "max_size"),
            (r#"{"max_width": -5}"#, "max_width"),
            (r#"{"throttle_secs": -0.5}"#, "throttle_secs"),
            (r#"{"throttle_secs": 1e20}"#, "throttle_secs"),
            (r#"{"skip_upscale_layers": -3}"#, "skip_upscale_layers"),
            (r#"{"oom_fallback": "taesd"}"#, "oom_fallback"),
        ];

        for (json, expected_key) in cases {
            match Settings::from_json_str(json) {
                Err(PreviewError::Config { key, .. }) => assert_eq!(key, expected_key, "{json}"),
                other => panic!("expected config error for {json}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_huge_throttle_is_rejected_not_panicking() {
        let err = Settings::from_json_str(r#"{"throttle_secs": 1e30}"#).unwrap_err();
        assert!(matches!(err, PreviewError::Config { key: "throttle_secs", .. }));

        let settings = Settings::from_json_str(r#"{"throttle_secs": 0.25}"#).unwrap();
        assert_eq!(settings.throttle(), Duration::from_millis(250));
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        let err = serde_json::from_str::<Settings>(r#"{"max_batch": 0}"#).unwrap_err();
        assert!(err.to_string().contains("max_batch"), "{err}");

        assert!(serde_json::from_str::<Settings>(r#"{"throttle_secs": 1e20}"#).is_err());

        let settings: Settings =
            serde_json::from_str(r#"{"btp_max_size": 512, "max_batch": 6}"#).unwrap();
        assert_eq!(settings.target_size(), (512, 512));
        assert_eq!(settings.max_batch(), 6);
        assert_eq!(settings, Settings::from_json_str(r#"{"max_size": 512, "max_batch": 6}"#).unwrap());
    }

    #[test]
    fn test_malformed_mapping_is_fatal() {
        let err = Settings::from_json_str(r#"{"max_batch": "four"}"#).unwrap_err();
        assert!(matches!(err, PreviewError::Json(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_skip_directive_mapping() {
        assert_eq!(SkipPolicy::from_directive(0).unwrap(), SkipPolicy::Fixed(0));
        assert_eq!(SkipPolicy::from_directive(2).unwrap(), SkipPolicy::Fixed(2));
        assert_eq!(SkipPolicy::from_directive(-1).unwrap(), SkipPolicy::Conservative);
        assert_eq!(SkipPolicy::from_directive(-2).unwrap(), SkipPolicy::Aggressive);
        assert!(SkipPolicy::from_directive(-7).is_err());
    }

    #[test]
    fn test_oom_fallback_parsing() {
        assert_eq!("none".parse::<OomFallback>().unwrap(), OomFallback::None);
        assert_eq!(
            " Latent2RGB ".parse::<OomFallback>().unwrap(),
            OomFallback::Latent2Rgb
        );
        assert!("vae".parse::<OomFallback>().is_err());
    }

    #[test]
    fn test_compile_setting_variants() {
        let off = Settings::from_json_str(r#"{"compile_previewer": false}"#).unwrap();
        assert_eq!(off.compile_previewer, CompileSetting::Disabled);
        assert!(!off.compile_previewer.is_enabled());

        let on = Settings::from_json_str(r#"{"compile_previewer": true}"#).unwrap();
        assert_eq!(on.compile_previewer, CompileSetting::Enabled);
        assert!(on.compile_previewer.options().is_none());

        let empty = Settings::from_json_str(r#"{"compile_previewer": {}}"#).unwrap();
        assert_eq!(empty.compile_previewer, CompileSetting::Enabled);

        let custom = Settings::from_json_str(
            r#"{"compile_previewer": {"mode": "max-autotune", "fullgraph": true}}"#,
        )
        .unwrap();
        let opts = custom.compile_previewer.options().unwrap();
        assert_eq!(opts.mode.as_deref(), Some("max-autotune"));
        assert_eq!(opts.fullgraph, Some(true));
        assert_eq!(opts.backend, None);
    }

    #[test]
    fn test_blank_device_is_unset() {
        let settings = Settings::from_json_str(r#"{"preview_device": "  "}"#).unwrap();
        assert_eq!(settings.preview_device, None);

        let settings = Settings::from_json_str(r#"{"preview_device": " cuda:1 "}"#).unwrap();
        assert_eq!(settings.preview_device.as_deref(), Some("cuda:1"));
    }

    #[test]
    fn test_from_map() {
        let mut map = serde_json::Map::new();
        map.insert("max_batch_cols".into(), serde_json::json!(3));
        map.insert("throttle_secs".into(), serde_json::json!(0));
        map.insert("unrelated_option".into(), serde_json::json!("ignored"));

        let settings = Settings::resolve(RawOptions::from_map(map).unwrap()).unwrap();
        assert_eq!(settings.max_batch_cols, 3);
        assert_eq!(settings.throttle(), Duration::ZERO);
    }
}
