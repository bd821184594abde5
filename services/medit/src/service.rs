use crate::blob_store::BlobStore;
use crate::config::Config;
use crate::enhancer::Enhancer;
use crate::error::MeditError;
use crate::metadata_store::MetadataStore;
use crate::post::{MeditMetadata, Submission, Terse};
use crate::query::{self, RangeQuery};
use crate::validator::Validator;
use anyhow::Context;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Write and read orchestration over the metadata and blob stores
pub struct MeditService {
    validator: Validator,
    enhancer: Enhancer,
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    detail_concurrency: usize,
}

impl MeditService {
    pub fn new(
        config: &Config,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            validator: Validator::new(config.limits.clone()),
            enhancer: Enhancer::new(
                config.medit.ctxt.clone(),
                config.medit.date_format.clone(),
                config.service.version.clone(),
            ),
            metadata,
            blobs,
            detail_concurrency: config.api.detail_concurrency.max(1),
        }
    }

    /// Validate, stamp and store a new medit
    ///
    /// Metadata is written first and the document only once that succeeded.
    /// If the document write fails the metadata entry is deleted again so the
    /// index never points at a missing document.
    #[instrument(skip(self, submission))]
    pub async fn post(&self, submission: Submission) -> Result<Terse, MeditError> {
        let problems = self.validator.validate(&submission);
        if !problems.is_empty() {
            debug!(?problems, "Medit rejected");
            metrics::counter!("medit.posts.rejected").increment(1);
            return Err(MeditError::Invalid { problems });
        }

        let medit = self.enhancer.enhance(Uuid::new_v4(), submission);
        let id = medit.id.clone();

        info!(id = %id, ctxt = %medit.ctxt, "Posting medit");

        if let Err(source) = self.metadata.write_metadata(&medit.metadata()).await {
            error!(id = %id, error = %source, "Failed to store medit metadata");
            metrics::counter!("medit.posts.failed").increment(1);
            return Err(MeditError::Metadata { id, source });
        }

        let stored = match serde_json::to_vec(&medit).context("Failed to serialize medit") {
            Ok(document) => self.blobs.write_blob(&id, document).await,
            Err(e) => Err(e),
        };

        if let Err(source) = stored {
            error!(id = %id, error = %source, "Failed to store medit document");
            metrics::counter!("medit.posts.failed").increment(1);
            self.remove_metadata(&id).await;
            return Err(MeditError::Blob { id, source });
        }

        info!(id = %id, at = medit.at, "Medit stored");
        metrics::counter!("medit.posts.stored").increment(1);

        Ok(medit.terse())
    }

    /// Compensate for a document write that failed after its metadata landed
    async fn remove_metadata(&self, id: &str) {
        match self.metadata.delete_metadata(id).await {
            Ok(()) => warn!(id = %id, "Removed metadata of unstored medit"),
            Err(e) => {
                error!(id = %id, error = %e, "Metadata left without a document");
                metrics::counter!("medit.orphans.unresolved").increment(1);
            }
        }
    }

    /// The stored document for `id`, byte for byte
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, MeditError> {
        metrics::counter!("medit.reads").increment(1);

        self.blobs
            .read_blob(id)
            .await
            .map_err(|source| MeditError::Read {
                id: id.to_string(),
                source,
            })
    }

    /// Medits of the configured context created within the query window
    ///
    /// `skip` applies to index matches; `max` and `max_len` to the rows
    /// produced from them. Detail rows whose document is missing are dropped.
    #[instrument(skip(self))]
    pub async fn query(&self, query: &RangeQuery) -> Result<Vec<Value>, MeditError> {
        metrics::counter!("medit.queries").increment(1);

        let matches = self
            .metadata
            .query_range(query.begin_at, query.end_at, self.enhancer.ctxt())
            .await
            .map_err(MeditError::Query)?;

        debug!(count = matches.len(), "Range matched");

        let matches = matches.into_iter().skip(query.skip);

        let rows = if query.detail {
            self.fetch_documents(matches, query.max).await?
        } else {
            matches.map(|meta| meta.terse().into()).collect()
        };

        Ok(query::trim(rows, query.max, query.max_len))
    }

    /// Read the documents behind `matches` in order, stopping once `max`
    /// documents were found
    async fn fetch_documents(
        &self,
        matches: impl Iterator<Item = MeditMetadata>,
        max: Option<usize>,
    ) -> Result<Vec<Value>, MeditError> {
        let blobs = &self.blobs;

        stream::iter(matches)
            .map(|meta| async move {
                match blobs.read_blob(&meta.id).await {
                    Ok(Some(bytes)) => serde_json::from_slice::<Value>(&bytes)
                        .with_context(|| format!("Stored medit {} is not JSON", meta.id))
                        .map(Some)
                        .map_err(|source| MeditError::Read {
                            id: meta.id.clone(),
                            source,
                        }),
                    Ok(None) => {
                        warn!(id = %meta.id, at = meta.at, "Indexed medit has no document");
                        metrics::counter!("medit.query.orphans").increment(1);
                        Ok(None)
                    }
                    Err(source) => Err(MeditError::Read {
                        id: meta.id,
                        source,
                    }),
                }
            })
            .buffered(self.detail_concurrency)
            .filter_map(|row| async move { row.transpose() })
            .take(max.unwrap_or(usize::MAX))
            .try_collect()
            .await
    }
}
