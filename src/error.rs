use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Metadata fetch error for {target}: {message}")]
    MetadataFetch { target: String, message: String },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("SQL validation failed: {0}")]
    Validation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InsightError {
    pub fn metadata_fetch(target: impl Into<String>, message: impl Into<String>) -> Self {
        InsightError::MetadataFetch {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InsightError::MetadataFetch { .. } => "metadata_fetch",
            InsightError::Generation(_) => "generation",
            InsightError::Retrieval(_) => "retrieval",
            InsightError::Validation(_) => "validation",
            InsightError::Execution(_) => "execution",
            InsightError::Cache(_) => "cache",
            InsightError::Config(_) => "config",
            InsightError::Io(_) => "io",
            InsightError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;
