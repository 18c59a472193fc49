use thiserror::Error;

/// Per-article embedding contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    #[error("article {article_id} has no embedding")]
    MissingEmbedding { article_id: String },

    #[error("article {article_id} embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        article_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("article {article_id} embedding contains non-finite values")]
    NonFinite { article_id: String },

    #[error("article {article_id} embedding is a zero vector")]
    DegenerateVector { article_id: String },
}

impl VectorError {
    pub fn article_id(&self) -> &str {
        match self {
            VectorError::MissingEmbedding { article_id }
            | VectorError::DimensionMismatch { article_id, .. }
            | VectorError::NonFinite { article_id }
            | VectorError::DegenerateVector { article_id } => article_id,
        }
    }
}

/// Invalid configuration, rejected before any clustering work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidEnvValue { name: String, value: String },
}

impl ConfigError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        ConfigError::InvalidParameter(message.into())
    }
}

/// Batch-level schema violations that fail the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("article at position {position} has a blank article_id")]
    BlankArticleId { position: usize },

    #[error("article_id {article_id} appears more than once in the batch")]
    DuplicateArticleId { article_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("cannot aggregate an empty cluster")]
    EmptyCluster,
}
