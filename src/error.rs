use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("invalid state: cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("invalid target duration: {0} months (expected one of 12, 24, 36, 60)")]
    InvalidDuration(u32),

    #[error("training failed: {message}")]
    TrainingFailed {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("cross-validation has not been run yet")]
    NotYetEvaluated,

    #[error("inference failed for {ticker}: {reason}")]
    Inference { ticker: String, reason: String },

    #[error("insufficient data: need at least {needed} rows, got {actual}")]
    InsufficientData { needed: usize, actual: usize },

    #[error("collaborator error: {0:#}")]
    Collaborator(#[source] anyhow::Error),
}

impl ForecastError {
    pub fn training_failed(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::TrainingFailed {
            message: message.into(),
            source,
        }
    }
}

pub type ForecastResult<T> = Result<T, ForecastError>;
