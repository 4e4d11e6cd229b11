//! Execution context carrying engine configuration

use super::{cross_entropy_with, Tensor};
use crate::config::{validate_config, EngineConfig};
use crate::error::{Error, Result};
use crate::gradcheck::{check_gradient, GradCheckReport};
use ndarray::ArrayD;

/// Context applying an [`EngineConfig`] to configurable operations
#[derive(Debug, Clone, Default)]
pub struct Context {
    config: EngineConfig,
}

impl Context {
    /// Create a context with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from a validated configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        validate_config(&config).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fused softmax + cross-entropy using the configured gradient scaling
    pub fn cross_entropy(&self, logits: &Tensor, targets: &[usize]) -> Result<Tensor> {
        cross_entropy_with(logits, targets, self.config.cross_entropy.scaling)
    }

    /// Gradient check using the configured step and tolerance
    pub fn check_gradient<F>(&self, f: F, x: &ArrayD<f32>) -> Result<GradCheckReport>
    where
        F: Fn(&Tensor) -> Result<Tensor>,
    {
        check_gradient(f, x, &self.config.gradcheck)
    }
}
