//! Ingestion collaborator interface
//!
//! The import stage never talks to a knowledge store directly; it hands each
//! URL to an [`Ingestor`] and classifies what comes back.

use crate::state::ResultStatus;
use async_trait::async_trait;
use thiserror::Error;

/// Processing options forwarded with every URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    pub enable_multimodal: Option<bool>,
}

/// A URL accepted by the knowledge store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingested {
    /// Identifier of the created knowledge artifact, when the store returns one
    pub knowledge_id: Option<String>,
}

/// Why an ingestion call did not create anything
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestFailure {
    /// The content is already present in the knowledge base
    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    Failed(String),
}

impl IngestFailure {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Outcome tag recorded for this failure
    pub fn result_status(&self) -> ResultStatus {
        match self {
            Self::Duplicate(_) => ResultStatus::Duplicate,
            Self::Failed(_) => ResultStatus::Failed,
        }
    }
}

/// Turns a URL's content into a stored knowledge artifact
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn create_from_url(
        &self,
        knowledge_base_id: &str,
        url: &str,
        options: &IngestOptions,
    ) -> Result<Ingested, IngestFailure>;
}
