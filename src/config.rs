//! Loads the tuner/channel configuration consumed by [`crate::controller`].
//!
//! The file format is a plain `.ini`-style layout: `#` comment lines,
//! blank lines, and `Key "value"` pairs for `Freq`,
//! `Bandwidth`, `Module`, and `ProgramNumber`. Unrecognized or malformed
//! lines are skipped with a warning rather than treated as fatal, since a
//! stray line in a hand-edited config file shouldn't prevent acquisition
//! from starting with whatever did parse.

use std::env;
use std::path::Path;

use crate::error::Result;

/// DVB modulation scheme selecting which tuner lock call to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    DvbT,
    DvbT2,
}

impl Default for Modulation {
    fn default() -> Self {
        Modulation::DvbT2
    }
}

/// Tuner and initial-channel configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Tune frequency, in Hz
    pub frequency: u32,
    /// Bandwidth, in MHz
    pub bandwidth: u32,
    /// Modulation scheme
    pub module: Modulation,
    /// 1-based position of the channel to start on among the acquired PAT's
    /// navigable channels (position 1 is the first entry after the NIT)
    pub program_number: u16,
}

impl Config {
    /// Loads configuration from a file at `path`, then applies any
    /// `DVBCORE_*` environment variable overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses configuration from an in-memory string, skipping comments,
    /// blank lines, and any line whose key isn't recognized.
    pub fn parse(content: &str) -> Self {
        let mut config = Config::default();

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let value = match extract_quoted_value(trimmed) {
                Some(v) => v,
                None => {
                    log::warn!("config: skipping unparsable line: {trimmed}");
                    continue;
                }
            };

            if trimmed.starts_with("Freq") {
                match value.parse() {
                    Ok(freq) => config.frequency = freq,
                    Err(_) => log::warn!("config: invalid Freq value: {value}"),
                }
            } else if trimmed.starts_with("Bandwidth") {
                match value.parse() {
                    Ok(bw) => config.bandwidth = bw,
                    Err(_) => log::warn!("config: invalid Bandwidth value: {value}"),
                }
            } else if trimmed.starts_with("Module") {
                config.module = match value {
                    "DVB_T" => Modulation::DvbT,
                    "DVB_T2" => Modulation::DvbT2,
                    other => {
                        log::warn!("config: unrecognized Module value: {other}");
                        continue;
                    }
                };
            } else if trimmed.starts_with("ProgramNumber") {
                match value.parse() {
                    Ok(n) => config.program_number = n,
                    Err(_) => log::warn!("config: invalid ProgramNumber value: {value}"),
                }
            } else {
                log::warn!("config: skipping unrecognized key in line: {trimmed}");
            }
        }

        log::info!(
            "config loaded: freq={} bandwidth={} module={:?} program_number={}",
            config.frequency,
            config.bandwidth,
            config.module,
            config.program_number
        );
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("DVBCORE_FREQ") {
            if let Ok(freq) = v.parse() {
                self.frequency = freq;
            }
        }
        if let Ok(v) = env::var("DVBCORE_BANDWIDTH") {
            if let Ok(bw) = v.parse() {
                self.bandwidth = bw;
            }
        }
        if let Ok(v) = env::var("DVBCORE_MODULE") {
            self.module = match v.as_str() {
                "DVB_T" => Modulation::DvbT,
                "DVB_T2" => Modulation::DvbT2,
                _ => self.module,
            };
        }
        if let Ok(v) = env::var("DVBCORE_PROGRAM_NUMBER") {
            if let Ok(n) = v.parse() {
                self.program_number = n;
            }
        }
    }
}

/// Extracts the substring between the first pair of double quotes on a line.
fn extract_quoted_value(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let end = start + line[start..].find('"')?;
    Some(&line[start..end])
}

/// Writes a starter config file with the four recognized keys, matching
/// the format the tuner/channel loader expects.
pub fn write_default_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = concat!(
            "# dvbcore tuner configuration\n",
            "Freq \"754000000\"\n",
            "Bandwidth \"8\"\n",
            "Module \"DVB_T2\"\n",
            "ProgramNumber \"1\"\n",
        );
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_keys() {
        let content = "\
# comment line should be skipped

Freq \"754000000\"
Bandwidth \"8\"
Module \"DVB_T2\"
ProgramNumber \"3\"
";
        let config = Config::parse(content);
        assert_eq!(config.frequency, 754_000_000);
        assert_eq!(config.bandwidth, 8);
        assert_eq!(config.module, Modulation::DvbT2);
        assert_eq!(config.program_number, 3);
    }

    #[test]
    fn skips_malformed_and_unrecognized_lines_without_failing() {
        let content = "\
Freq no-quotes-here
Unknown \"123\"
ProgramNumber \"5\"
";
        let config = Config::parse(content);
        assert_eq!(config.program_number, 5);
        assert_eq!(config.frequency, 0);
    }

    #[test]
    fn module_defaults_to_dvb_t2_when_absent() {
        let config = Config::parse("Freq \"1\"\n");
        assert_eq!(config.module, Modulation::DvbT2);
    }
}
