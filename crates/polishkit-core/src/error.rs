//! Error handling for PolishKit
//!
//! A single taxonomy covers the whole geometry-to-program pipeline:
//! - Geometry errors (degenerate normals, missing mesh data)
//! - Parameter errors (non-positive spacing, unknown strategy names)
//! - Precondition errors (planning before a model is loaded)
//! - Format errors (input is not an STL file at all)
//!
//! Degenerate-but-well-defined cases such as boundary vertices with too few
//! neighbours are not errors; the analyser returns neutral values for them.

use thiserror::Error;

/// Pipeline error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolishError {
    /// Geometry input violates a contract (zero-length normal, empty mesh).
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry {
        /// What was wrong with the geometry.
        reason: String,
    },

    /// A parameter is out of range or not recognised.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// The parameter name, qualified by stage where relevant.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Planning or generation requested before a model was loaded.
    #[error("No model loaded")]
    NoModelLoaded,

    /// The input is not parseable as STL.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A stage failed to plan and partial generation was not requested.
    #[error("Incomplete plan: stage '{stage}' failed: {reason}")]
    IncompletePlan {
        /// The stage that has no usable result.
        stage: String,
        /// The underlying failure.
        reason: String,
    },

    /// The run was cancelled between segments.
    #[error("Operation cancelled")]
    Cancelled,

    /// File system failure while reading or writing.
    #[error("I/O error: {reason}")]
    Io {
        /// The underlying I/O error message.
        reason: String,
    },
}

impl PolishError {
    /// Shorthand for [`PolishError::InvalidParameter`].
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`PolishError::InvalidGeometry`].
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }

    /// Prefix the parameter name with a stage so the caller knows where it failed.
    pub fn in_stage(self, stage: impl std::fmt::Display) -> Self {
        match self {
            Self::InvalidParameter { name, reason } => Self::InvalidParameter {
                name: format!("{}.{}", stage, name),
                reason,
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for PolishError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PolishError>;

/// Fail with `InvalidParameter` unless `value` is finite and strictly positive.
pub fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PolishError::invalid_parameter(
            name,
            format!("must be a positive number, got {}", value),
        ))
    }
}

/// Fail with `InvalidParameter` unless `value` is finite and not negative.
pub fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PolishError::invalid_parameter(
            name,
            format!("must be zero or greater, got {}", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PolishError::invalid_parameter("stepover_ratio", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'stepover_ratio': must be positive"
        );

        assert_eq!(PolishError::NoModelLoaded.to_string(), "No model loaded");

        let err = PolishError::UnsupportedFormat("truncated header".to_string());
        assert_eq!(err.to_string(), "Unsupported format: truncated header");
    }

    #[test]
    fn test_in_stage_qualifies_parameter() {
        let err = PolishError::invalid_parameter("spacing", "must be positive").in_stage("fine");
        assert!(matches!(
            err,
            PolishError::InvalidParameter { ref name, .. } if name == "fine.spacing"
        ));

        let err = PolishError::NoModelLoaded.in_stage("fine");
        assert_eq!(err, PolishError::NoModelLoaded);
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.stl");
        let err: PolishError = io_err.into();
        assert!(matches!(err, PolishError::Io { .. }));
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("speed", 10.0).is_ok());
        assert!(ensure_positive("speed", 0.0).is_err());
        assert!(ensure_positive("speed", -1.0).is_err());
        assert!(ensure_positive("speed", f64::NAN).is_err());
        assert!(ensure_non_negative("safety_height", 0.0).is_ok());
        assert!(ensure_non_negative("safety_height", -0.1).is_err());
    }
}
