use thiserror::Error;

/// Failures of the calibration region detector.
///
/// Both variants mean the calibration spectrum of one key could not be
/// partitioned; the caller skips that key and carries on with the others.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("found {found} peak candidates, at least {required} are needed")]
    InsufficientPeaks { found: usize, required: usize },

    #[error("cannot separate Stokes and anti-Stokes peaks: {left} left / {right} right of center, need {required} on each side")]
    AmbiguousCenter { left: usize, right: usize, required: usize },

    #[error("spectrum is empty")]
    EmptySpectrum,
}

/// Failures of the non-linear region fits and the VIPA model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("region holds {samples} samples but the model has {parameters} free parameters")]
    TooFewSamples { samples: usize, parameters: usize },

    #[error("invalid bounds for parameter {parameter}: ({lower}, {upper})")]
    InvalidBounds { parameter: usize, lower: f64, upper: f64 },

    #[error("fit did not converge after {iterations} iterations")]
    DidNotConverge { iterations: usize },
}
