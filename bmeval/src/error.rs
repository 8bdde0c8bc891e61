use thiserror::Error;

use bmcore::error::DetectionError;

use crate::data::extraction::ImageKind;

/// Failures of the scan grid key mapping.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("{axis} index {index} out of range for resolution {bound}")]
    IndexOutOfRange { axis: char, index: usize, bound: usize },
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(&'static str),
    #[error("no spectra available for {kind} image {key}")]
    ExtractionUnavailable { kind: ImageKind, key: String },
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode session: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode session: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("invalid setup: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(found: usize) -> Result<(), DetectionError> {
        Err(DetectionError::InsufficientPeaks { found, required: 6 })
    }

    fn calibrate(found: usize) -> Result<(), EvalError> {
        detect(found)?;
        Ok(())
    }

    #[test]
    fn test_detection_error_converts_transparently() {
        let err = calibrate(3).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Detection(DetectionError::InsufficientPeaks { found: 3, required: 6 })
        ));
        assert_eq!(
            err.to_string(),
            DetectionError::InsufficientPeaks { found: 3, required: 6 }.to_string()
        );
    }

    #[test]
    fn test_prerequisite_message() {
        let err = EvalError::MissingPrerequisite("calibration");
        assert_eq!(err.to_string(), "missing prerequisite: calibration");
    }
}
