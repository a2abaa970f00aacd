//! Classifier configuration

use serde::{Deserialize, Serialize};

/// What to do when the pixel buffer is smaller than the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndersizedInputPolicy {
    /// Fail with `InputUnderflow`
    #[default]
    Reject,
    /// Zero the tail of the input buffer before executing
    ZeroFill,
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Undersized pixel input handling
    pub undersized_input: UndersizedInputPolicy,

    /// Number of ranked classes reported alongside the best one
    pub top_k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            undersized_input: UndersizedInputPolicy::Reject,
            top_k: 3,
        }
    }
}

impl ClassifierConfig {
    /// Exact-size input only
    pub fn strict() -> Self {
        Self {
            undersized_input: UndersizedInputPolicy::Reject,
            ..Default::default()
        }
    }

    /// Accept short input, zero-padded
    pub fn lenient() -> Self {
        Self {
            undersized_input: UndersizedInputPolicy::ZeroFill,
            ..Default::default()
        }
    }
}
