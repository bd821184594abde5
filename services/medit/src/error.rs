use crate::validator::Problem;
use thiserror::Error;

/// Failures of the medit write and read paths
#[derive(Error, Debug)]
pub enum MeditError {
    #[error("Medit rejected: {problems:?}")]
    Invalid { problems: Vec<Problem> },

    #[error("Failed to store metadata for medit {id}")]
    Metadata {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to store document for medit {id}")]
    Blob {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read medit {id}")]
    Read {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Range query failed")]
    Query(#[source] anyhow::Error),
}

impl MeditError {
    /// Id of the medit the failed operation was about, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            MeditError::Metadata { id, .. }
            | MeditError::Blob { id, .. }
            | MeditError::Read { id, .. } => Some(id),
            MeditError::Invalid { .. } | MeditError::Query(_) => None,
        }
    }
}
