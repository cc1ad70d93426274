use crate::keycodes::key_from_name;
use crate::qukeys::{Qukey, Qukeys, QukeysSettings, LAYER_WILDCARD};
use crate::types::KeyPosition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed qukeys config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown key name `{0}`")]
    UnknownKey(String),
    #[error("qukey {index}: {row},{col} is not a valid key position")]
    InvalidPosition { index: usize, row: u8, col: u8 },
    #[error("qukey {index}: layer {layer} is out of range")]
    InvalidLayer { index: usize, layer: u8 },
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("{value} is out of range for {parameter} (max {max})")]
    OutOfRange {
        parameter: Parameter,
        value: u32,
        max: u32,
    },
}

/// Tunable engine parameters, by their configuration-surface names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    HoldTimeout,
    MaxIntervalForTapRepeat,
    OverlapThreshold,
    MinimumHoldTime,
    MinimumPriorInterval,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::HoldTimeout,
        Parameter::MaxIntervalForTapRepeat,
        Parameter::OverlapThreshold,
        Parameter::MinimumHoldTime,
        Parameter::MinimumPriorInterval,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Parameter::HoldTimeout => "qukeys.hold_timeout",
            Parameter::MaxIntervalForTapRepeat => "qukeys.max_tap_repeat_interval",
            Parameter::OverlapThreshold => "qukeys.overlap_threshold",
            Parameter::MinimumHoldTime => "qukeys.minimum_hold_time",
            Parameter::MinimumPriorInterval => "qukeys.minimum_prior_interval",
        }
    }

    /// Largest value the parameter can store.
    pub const fn max(self) -> u32 {
        match self {
            Parameter::HoldTimeout => u16::MAX as u32,
            _ => u8::MAX as u32,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Parameter::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownParameter(s.to_string()))
    }
}

impl<const N: usize> Qukeys<N> {
    pub fn parameter(&self, parameter: Parameter) -> u32 {
        match parameter {
            Parameter::HoldTimeout => u32::from(self.hold_timeout()),
            Parameter::MaxIntervalForTapRepeat => u32::from(self.max_interval_for_tap_repeat()),
            Parameter::OverlapThreshold => u32::from(self.overlap_threshold()),
            Parameter::MinimumHoldTime => u32::from(self.minimum_hold_time()),
            Parameter::MinimumPriorInterval => u32::from(self.minimum_prior_interval()),
        }
    }

    pub fn set_parameter(&mut self, parameter: Parameter, value: u32) -> Result<(), ConfigError> {
        if value > parameter.max() {
            return Err(ConfigError::OutOfRange {
                parameter,
                value,
                max: parameter.max(),
            });
        }
        // Range checked above.
        match parameter {
            Parameter::HoldTimeout => self.set_hold_timeout(value as u16),
            Parameter::MaxIntervalForTapRepeat => self.set_max_interval_for_tap_repeat(value as u8),
            Parameter::OverlapThreshold => self.set_overlap_threshold(value as u8),
            Parameter::MinimumHoldTime => self.set_minimum_hold_time(value as u8),
            Parameter::MinimumPriorInterval => self.set_minimum_prior_interval(value as u8),
        }
        Ok(())
    }
}

/// One row of the qukey table as written in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QukeyEntry {
    /// Absent means every layer.
    #[serde(default)]
    pub layer: Option<u8>,
    pub row: u8,
    pub col: u8,
    /// Key name, see `keycodes::key_from_name`.
    pub alternate: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QukeysConfig {
    pub settings: QukeysSettings,
    pub qukeys: Vec<QukeyEntry>,
}

impl QukeysConfig {
    pub fn qukey_table(&self) -> Result<Vec<Qukey>, ConfigError> {
        self.qukeys
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let position = KeyPosition::new(entry.row, entry.col);
                if !position.is_valid() {
                    return Err(ConfigError::InvalidPosition {
                        index,
                        row: entry.row,
                        col: entry.col,
                    });
                }
                let layer = match entry.layer {
                    None => LAYER_WILDCARD,
                    Some(layer) => i8::try_from(layer)
                        .map_err(|_| ConfigError::InvalidLayer { index, layer })?,
                };
                let alternate_key = key_from_name(&entry.alternate)
                    .ok_or_else(|| ConfigError::UnknownKey(entry.alternate.clone()))?;
                Ok(Qukey::new(layer, position, alternate_key))
            })
            .collect()
    }

    pub fn build_engine<const N: usize>(&self) -> Result<Qukeys<N>, ConfigError> {
        Ok(Qukeys::with_settings(self.qukey_table()?, self.settings))
    }
}

pub fn parse_config(content: &str) -> Result<QukeysConfig, ConfigError> {
    Ok(serde_json::from_str(content)?)
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<QukeysConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&raw)?;
    info!(
        "Qukeys config loaded from {}: {} qukeys",
        path.display(),
        config.qukeys.len()
    );
    Ok(config)
}
