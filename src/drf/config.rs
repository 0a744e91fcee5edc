//! Channel metadata and the `winsdr.ini`-style main config file.
//!
//! §1 names INI-style configuration readers as out of scope ("treat as
//! external collaborators, interfaces only"): this loader is intentionally
//! minimal — enough structure to get a channel table and a record
//! directory out of a file, not a general-purpose INI engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, SeismuxError};

/// Per-channel metadata (§3), used for volts-per-count derivation and for
/// naming in wire/text headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Station identifier.
    pub station: String,
    /// Component (e.g. `CH1`, `EHZ`).
    pub component: String,
    /// Network identifier.
    pub network: String,
    /// Location identifier.
    pub location: String,
    /// ADC resolution in bits.
    pub adc_bits: u32,
    /// ADC input, volts full-scale. Not read from the `Chan` line; fixed
    /// at parse time.
    pub adc_volts: f64,
    /// Analog gain.
    pub gain: f64,
}

impl ChannelConfig {
    /// Volts represented by one least-significant count, derived from
    /// sensor output, ADC input range, resolution and gain (§3).
    #[must_use]
    pub fn volts_per_count(&self) -> f64 {
        let full_scale_counts = 2f64.powi(self.adc_bits as i32);
        (self.adc_volts / full_scale_counts) / self.gain
    }
}

/// Top-level DRF extractor configuration (the `-w winsdr.ini` file).
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Expected channel count; must equal `hdr.numChannels` (§3 invariant).
    pub channels: Vec<ChannelConfig>,
    /// System number used in day-file names (`sys<N>...`).
    pub system_number: u32,
    /// Directory holding day files.
    pub record_dir: PathBuf,
}

impl Config {
    /// Number of configured channels.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Load from a simple `key = value` file, one channel per `Chan` line
    /// as `sta comp net loc bits gain`, `#` comments, blank lines ignored.
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse config text directly (used by tests and by [`Config::load`]).
    pub fn parse(text: &str) -> Result<Config> {
        let mut kv: HashMap<String, String> = HashMap::new();
        let mut channels = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SeismuxError::config(format!("line {}: expected 'key = value'", lineno + 1))
            })?;
            let key = key.trim();
            let value = value.trim();

            if key.eq_ignore_ascii_case("Chan") {
                let fields: Vec<&str> = value.split_whitespace().collect();
                if fields.len() != 6 {
                    return Err(SeismuxError::config(format!(
                        "line {}: Chan needs 6 fields, got {}",
                        lineno + 1,
                        fields.len()
                    )));
                }
                channels.push(ChannelConfig {
                    station: fields[0].to_string(),
                    component: fields[1].to_string(),
                    network: fields[2].to_string(),
                    location: fields[3].to_string(),
                    adc_bits: fields[4].parse().map_err(|_| {
                        SeismuxError::config(format!("line {}: bad ADC bits", lineno + 1))
                    })?,
                    gain: fields[5].parse().map_err(|_| {
                        SeismuxError::config(format!("line {}: bad gain", lineno + 1))
                    })?,
                    adc_volts: 5.0,
                });
            } else {
                kv.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }

        let system_number = kv
            .get("systemnumber")
            .map(|v| v.parse())
            .transpose()
            .map_err(|_| SeismuxError::config("SystemNumber must be an integer"))?
            .unwrap_or(1);
        let record_dir = kv
            .get("recorddir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Config {
            channels,
            system_number,
            record_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let text = "\
            # comment\n\
            SystemNumber = 7\n\
            RecordDir = /data/drf\n\
            Chan = STA1 CH1 NT 00 24 1.0\n\
            Chan = STA1 CH2 NT 00 24 1.0\n\
        ";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.system_number, 7);
        assert_eq!(cfg.record_dir, PathBuf::from("/data/drf"));
        assert_eq!(cfg.num_channels(), 2);
        assert_eq!(cfg.channels[0].station, "STA1");
        assert_eq!(cfg.channels[1].component, "CH2");
    }

    #[test]
    fn volts_per_count() {
        let ch = ChannelConfig {
            station: "S".into(),
            component: "C".into(),
            network: "N".into(),
            location: "L".into(),
            adc_bits: 24,
            adc_volts: 5.0,
            gain: 1.0,
        };
        let vpc = ch.volts_per_count();
        assert!((vpc - 5.0 / 2f64.powi(24)).abs() < 1e-15);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(Config::parse("not a kv line").is_err());
    }
}
