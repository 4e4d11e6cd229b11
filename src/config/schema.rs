//! YAML schema definitions for engine configuration

use serde::{Deserialize, Serialize};

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fused softmax + cross-entropy settings
    #[serde(default)]
    pub cross_entropy: CrossEntropySpec,

    /// Finite-difference gradient checking settings
    #[serde(default)]
    pub gradcheck: GradCheckConfig,
}

/// Cross-entropy configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossEntropySpec {
    /// How the gradient sent back to the logits is scaled
    #[serde(default)]
    pub scaling: CrossEntropyScaling,
}

/// Scaling of the fused cross-entropy gradient
///
/// The forward loss is always the batch mean. `Sum` returns
/// `softmax - one_hot` unscaled, i.e. the gradient of the batch sum;
/// `Mean` divides by the batch size so the gradient matches the reported
/// loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossEntropyScaling {
    #[default]
    Sum,
    Mean,
}

impl CrossEntropyScaling {
    /// Multiplier applied to `softmax - one_hot` for a batch of `batch` rows
    pub fn factor(self, batch: usize) -> f32 {
        match self {
            CrossEntropyScaling::Sum => 1.0,
            CrossEntropyScaling::Mean => 1.0 / batch.max(1) as f32,
        }
    }
}

/// Gradient check tolerances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradCheckConfig {
    /// Central-difference step
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,

    /// Largest accepted error, relative to max(1, |analytic|, |numerical|)
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            tolerance: default_tolerance(),
        }
    }
}

fn default_epsilon() -> f32 {
    1e-2
}

fn default_tolerance() -> f32 {
    5e-2
}
