//! Sequencer configuration: grid dimensions and tempo bounds.
//!
//! These values are fixed for the lifetime of every room the process
//! serves. All clients in a deployment must agree on
//! `subdivisions_per_beat` and `total_steps` or their derived playhead
//! positions diverge.

use serde::Deserialize;

use super::error::ValidationError;

/// Sequencer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    /// Number of rows (instrument lines) in every grid
    #[serde(default = "default_total_rows")]
    pub total_rows: u32,

    /// Number of steps (columns) in every grid
    #[serde(default = "default_total_steps")]
    pub total_steps: u32,

    /// Grid subdivisions per beat (4 = 16th notes)
    #[serde(default = "default_subdivisions")]
    pub subdivisions_per_beat: u32,

    /// Lowest accepted tempo; out-of-range values are clamped
    #[serde(default = "default_bpm_min")]
    pub bpm_min: u16,

    /// Highest accepted tempo; out-of-range values are clamped
    #[serde(default = "default_bpm_max")]
    pub bpm_max: u16,

    /// Tempo a freshly created room starts at
    #[serde(default = "default_bpm")]
    pub default_bpm: u16,

    /// Buffer size for each room's broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl SequencerConfig {
    /// Clamp a client-supplied tempo into the configured range.
    pub fn clamp_bpm(&self, value: u16) -> u16 {
        value.clamp(self.bpm_min, self.bpm_max)
    }

    /// Validate sequencer configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.total_rows == 0 || self.total_steps == 0 {
            return Err(ValidationError::EmptyGrid);
        }
        if self.subdivisions_per_beat == 0 {
            return Err(ValidationError::InvalidSubdivisions);
        }
        if self.bpm_min == 0 || self.bpm_min > self.bpm_max {
            return Err(ValidationError::InvalidBpmRange);
        }
        if self.default_bpm < self.bpm_min || self.default_bpm > self.bpm_max {
            return Err(ValidationError::DefaultBpmOutOfRange);
        }
        Ok(())
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            total_rows: default_total_rows(),
            total_steps: default_total_steps(),
            subdivisions_per_beat: default_subdivisions(),
            bpm_min: default_bpm_min(),
            bpm_max: default_bpm_max(),
            default_bpm: default_bpm(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_total_rows() -> u32 {
    13
}

fn default_total_steps() -> u32 {
    16
}

fn default_subdivisions() -> u32 {
    4
}

fn default_bpm_min() -> u16 {
    60
}

fn default_bpm_max() -> u16 {
    150
}

fn default_bpm() -> u16 {
    100
}

fn default_channel_capacity() -> usize {
    128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.total_rows, 13);
        assert_eq!(config.total_steps, 16);
        assert_eq!(config.subdivisions_per_beat, 4);
        assert_eq!(config.default_bpm, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_clamp_bpm() {
        let config = SequencerConfig::default();
        assert_eq!(config.clamp_bpm(30), 60);
        assert_eq!(config.clamp_bpm(100), 100);
        assert_eq!(config.clamp_bpm(9999), 150);
    }

    #[test]
    fn test_validation_empty_grid() {
        let config = SequencerConfig {
            total_rows: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_inverted_bpm_range() {
        let config = SequencerConfig {
            bpm_min: 200,
            bpm_max: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_default_bpm_out_of_range() {
        let config = SequencerConfig {
            default_bpm: 50,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_subdivisions() {
        let config = SequencerConfig {
            subdivisions_per_beat: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
