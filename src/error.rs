//! Error types for the Kolosal classifier facade

use thiserror::Error;

/// Result type alias for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Main error type for the classifier facade and its estimators
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Unknown algorithm '{requested}'. Available classifiers: {}", .available.join(", "))]
    UnknownAlgorithm {
        requested: String,
        available: Vec<String>,
    },

    #[error("Model has not been created yet")]
    ModelNotReady,

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ClassifierError {
    pub(crate) fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ClassifierError {
    fn from(err: ndarray::ShapeError) -> Self {
        ClassifierError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for ClassifierError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ClassifierError::ThreadPoolError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassifierError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_unknown_algorithm_lists_names() {
        let err = ClassifierError::UnknownAlgorithm {
            requested: "Perceptron".to_string(),
            available: vec!["Dummy".to_string(), "KNN".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown algorithm 'Perceptron'. Available classifiers: Dummy, KNN"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClassifierError = io_err.into();
        assert!(matches!(err, ClassifierError::IoError(_)));
    }
}
