use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("An index build is already in progress")]
    BuildInProgress,

    #[error("No index has been built or loaded yet")]
    IndexUnavailable,

    #[error("Failed to embed query: {0}")]
    QueryEmbedding(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AssistError {
    /// True for every error that means "search cannot rank right now".
    #[inline]
    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable | Self::QueryEmbedding(_))
    }
}

pub mod assistant;
pub mod autoheal;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod freshness;
pub mod index;
pub mod retrieval;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod test_support;
