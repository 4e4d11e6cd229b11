//! Configuration validation

use super::schema::EngineConfig;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid gradcheck epsilon: {0} (must be finite and > 0.0)")]
    InvalidEpsilon(f32),

    #[error("Invalid gradcheck tolerance: {0} (must be finite and > 0.0)")]
    InvalidTolerance(f32),
}

/// Validate an engine configuration
pub fn validate_config(config: &EngineConfig) -> Result<(), ValidationError> {
    let epsilon = config.gradcheck.epsilon;
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(ValidationError::InvalidEpsilon(epsilon));
    }

    let tolerance = config.gradcheck.tolerance;
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(ValidationError::InvalidTolerance(tolerance));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_epsilon() {
        let mut config = EngineConfig::default();
        config.gradcheck.epsilon = 0.0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEpsilon(_)));

        config.gradcheck.epsilon = f32::NAN;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEpsilon(_)));
    }

    #[test]
    fn test_invalid_tolerance() {
        let mut config = EngineConfig::default();
        config.gradcheck.tolerance = -1.0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTolerance(_)));
    }
}
