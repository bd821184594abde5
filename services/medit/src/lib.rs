//! Medit Service
//!
//! Storage service for medits: short user-submitted text posts. Each post is
//! validated against configured length limits, stamped with an id, creation
//! time and context tag, indexed in DynamoDB and stored whole in S3.
//!
//! ## Features
//!
//! - **Validation**: every length check runs and all problems are reported
//!   together
//! - **Two-store persistence**: `(id, ctxt, at)` goes to an indexed metadata
//!   table, the full document to a blob store under `{base_path}/{id}`
//! - **Range queries**: medits of one context within a time window, as terse
//!   `{id, at}` rows or full documents, with skip/max paging and field
//!   truncation
//!
//! ## Architecture
//!
//! ```text
//!   HTTP                      DynamoDB                  S3 Bucket
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ POST /medit  │          │ medit table  │          │ {base_path}/ │
//! │ GET  /medit  │          │ ctxt-at-index│          │   {id}       │
//! │ GET  /medits │          └──────────────┘          └──────────────┘
//! └──────────────┘                 ▲                         ▲
//!        │                         │                         │
//!        ▼                         │                         │
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ Validator    │─────────▶│ Metadata     │─────────▶│ Blob         │
//! │ Enhancer     │          │ Store        │          │ Store        │
//! └──────────────┘          └──────────────┘          └──────────────┘
//!                                  │                         │
//!                                  ▼                         ▼
//!                           ┌────────────────────────────────────┐
//!                           │ Query trimmer (skip, max, maxlen)  │
//!                           └────────────────────────────────────┘
//! ```

pub mod api;
pub mod blob_store;
pub mod config;
pub mod enhancer;
pub mod error;
pub mod metadata_store;
pub mod post;
pub mod query;
pub mod service;
pub mod validator;

pub use api::{AppState, MeditsParams};
pub use blob_store::{BlobStore, InMemoryBlobStore, S3BlobStore};
pub use config::{Config, StorageBackend};
pub use enhancer::Enhancer;
pub use error::MeditError;
pub use metadata_store::{DynamoMetadataStore, InMemoryMetadataStore, MetadataStore};
pub use post::{Medit, MeditMetadata, Submission, Terse};
pub use query::RangeQuery;
pub use service::MeditService;
pub use validator::{Problem, Validator};
