//! Library error type.

pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("oracle error: {0}")]
    Oracle(String),

    /// Saving a recorded run failed; the scenario stays dirty.
    #[error("persistence failure: {0}")]
    Persistence(String),
}
