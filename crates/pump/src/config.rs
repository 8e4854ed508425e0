//! TOML config file loading and validation for the watering rig.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    pub strip: StripConfig,
    pub watering: WateringConfig,
}

#[derive(Debug, Deserialize)]
pub struct StripConfig {
    /// Strip address (hostname or IP; port 9999 implied).
    pub host: String,
    /// Explicit device id; taken from the strip's system info when unset.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pump outlet, 1-based as printed on the strip.
    pub outlet: u8,
}

#[derive(Debug, Deserialize)]
pub struct WateringConfig {
    /// Idle dryness threshold on the raw/100 scale; readings above this
    /// start a watering cycle.
    pub upper_threshold: f32,
    /// Watering satisfaction threshold on the same scale; a cycle stops
    /// once readings drop below this.
    pub lower_threshold: f32,
    /// Watering cycle budget; also the device-side failsafe delay.
    pub max_seconds: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    2500
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all entries. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // ── Strip ───────────────────────────────────────────────
        if self.strip.host.trim().is_empty() {
            errors.push("strip.host is empty".to_string());
        }
        if self.strip.outlet == 0 {
            errors.push("strip.outlet is 1-based, got 0".to_string());
        }
        if self.strip.timeout_ms == 0 {
            errors.push("strip.timeout_ms must be positive".to_string());
        }
        if let Some(id) = &self.strip.device_id {
            if id.trim().is_empty() {
                errors.push("strip.device_id is empty (omit it to auto-detect)".to_string());
            }
        }

        // ── Watering ────────────────────────────────────────────
        let w = &self.watering;
        if w.upper_threshold <= 0.0 {
            errors.push(format!(
                "watering.upper_threshold must be positive, got {}",
                w.upper_threshold
            ));
        }
        if w.lower_threshold <= 0.0 {
            errors.push(format!(
                "watering.lower_threshold must be positive, got {}",
                w.lower_threshold
            ));
        }
        if w.lower_threshold >= w.upper_threshold {
            errors.push(format!(
                "watering.lower_threshold ({}) must be below upper_threshold ({})",
                w.lower_threshold, w.upper_threshold
            ));
        }
        if w.max_seconds == 0 {
            errors.push("watering.max_seconds must be positive".to_string());
        }
        if w.poll_interval_ms == 0 {
            errors.push("watering.poll_interval_ms must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            strip: StripConfig {
                host: "192.168.0.111".into(),
                device_id: None,
                timeout_ms: 2000,
                outlet: 3,
            },
            watering: WateringConfig {
                upper_threshold: 500.0,
                lower_threshold: 400.0,
                max_seconds: 10,
                poll_interval_ms: 2500,
            },
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
[strip]
host = "192.168.0.111"
outlet = 3

[watering]
upper_threshold = 500.0
lower_threshold = 400.0
max_seconds = 10
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.strip.host, "192.168.0.111");
        assert_eq!(config.strip.outlet, 3);
        assert_eq!(config.strip.timeout_ms, 2000, "default applies");
        assert_eq!(config.watering.poll_interval_ms, 2500, "default applies");
        assert!(config.strip.device_id.is_none());
    }

    #[test]
    fn parse_explicit_device_id() {
        let toml_str = r#"
[strip]
host = "strip.local"
device_id = "8006ABCDEF"
outlet = 1

[watering]
upper_threshold = 500.0
lower_threshold = 400.0
max_seconds = 10
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.strip.device_id.as_deref(), Some("8006ABCDEF"));
    }

    #[test]
    fn parse_missing_section_fails() {
        assert!(toml::from_str::<Config>("[strip]\nhost = \"x\"\noutlet = 1\n").is_err());
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn empty_host_rejected() {
        let mut cfg = valid_config();
        cfg.strip.host = "  ".into();
        assert_validation_err(&cfg, "strip.host is empty");
    }

    #[test]
    fn outlet_zero_rejected() {
        let mut cfg = valid_config();
        cfg.strip.outlet = 0;
        assert_validation_err(&cfg, "1-based");
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut cfg = valid_config();
        cfg.strip.timeout_ms = 0;
        assert_validation_err(&cfg, "timeout_ms");
    }

    #[test]
    fn empty_device_id_rejected() {
        let mut cfg = valid_config();
        cfg.strip.device_id = Some("".into());
        assert_validation_err(&cfg, "device_id is empty");
    }

    #[test]
    fn lower_at_or_above_upper_rejected() {
        let mut cfg = valid_config();
        cfg.watering.lower_threshold = 500.0;
        assert_validation_err(&cfg, "must be below upper_threshold");

        cfg.watering.lower_threshold = 600.0;
        assert_validation_err(&cfg, "must be below upper_threshold");
    }

    #[test]
    fn non_positive_thresholds_rejected() {
        let mut cfg = valid_config();
        cfg.watering.upper_threshold = 0.0;
        assert_validation_err(&cfg, "upper_threshold must be positive");

        let mut cfg = valid_config();
        cfg.watering.lower_threshold = -1.0;
        assert_validation_err(&cfg, "lower_threshold must be positive");
    }

    #[test]
    fn zero_max_seconds_rejected() {
        let mut cfg = valid_config();
        cfg.watering.max_seconds = 0;
        assert_validation_err(&cfg, "max_seconds must be positive");
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut cfg = valid_config();
        cfg.watering.poll_interval_ms = 0;
        assert_validation_err(&cfg, "poll_interval_ms must be positive");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.strip.host = "".into();
        cfg.strip.outlet = 0;
        cfg.watering.max_seconds = 0;
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("strip.host is empty"), "missing host error in: {msg}");
        assert!(msg.contains("1-based"), "missing outlet error in: {msg}");
        assert!(msg.contains("max_seconds"), "missing max_seconds error in: {msg}");
    }
}
