use burn::record::RecorderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Error, Debug)]
pub enum ForecastError {
    /// Train-mode filtering removed every window.
    #[error("no windows available for training")]
    NoWindowsAvailable,

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("series too short: need at least {needed} steps, got {got}")]
    SeriesTooShort { needed: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("record error: {0}")]
    Record(String),
}

impl From<RecorderError> for ForecastError {
    fn from(err: RecorderError) -> Self {
        ForecastError::Record(format!("{err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_problem() {
        assert_eq!(
            ForecastError::NoWindowsAvailable.to_string(),
            "no windows available for training"
        );
        assert_eq!(
            ForecastError::MissingColumn("price".to_string()).to_string(),
            "missing column: price"
        );
        assert_eq!(
            ForecastError::SeriesTooShort { needed: 5, got: 3 }.to_string(),
            "series too short: need at least 5 steps, got 3"
        );
    }
}
