pub type CoreResult<T> = Result<T, CoreError>;

/// Fatal error taxonomy of the deconvolution core.
///
/// Constraint parse failures are deliberately absent: a malformed constraint
/// degrades to permissive bounds instead of failing the fit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("peak parameter '{field}' must be finite and > 0, got {value}")]
    InvalidParameter { field: &'static str, value: f64 },
    #[error("unknown peak shape '{name}'")]
    UnknownShape { name: String },
    #[error("energy window is empty or inverted: low={low}, high={high}")]
    InvalidRange { low: f64, high: f64 },
    #[error("no data points inside energy window {low}..{high}")]
    EmptyRange { low: f64, high: f64 },
    #[error("spectrum arrays must have equal non-zero lengths: energy={energy}, intensity={intensity}")]
    LengthMismatch { energy: usize, intensity: usize },
    #[error("spectrum energy must be strictly increasing, index {index} has {current} after {previous}")]
    NonIncreasingEnergy {
        index: usize,
        previous: f64,
        current: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::CoreError;

    #[test]
    fn error_messages_carry_the_offending_values() {
        let error = CoreError::InvalidParameter {
            field: "fwhm",
            value: -1.5,
        };
        assert_eq!(
            error.to_string(),
            "peak parameter 'fwhm' must be finite and > 0, got -1.5"
        );

        let error = CoreError::InvalidRange {
            low: 540.0,
            high: 520.0,
        };
        assert_eq!(
            error.to_string(),
            "energy window is empty or inverted: low=540, high=520"
        );
    }
}
