use crate::config::DynamoConfig;
use crate::post::MeditMetadata;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Builder as DynamoConfigBuilder;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::{debug, info, instrument};

/// Index of medit metadata, range-queryable by `at` within a context
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store the projection of a new medit; fails if the id is already taken
    async fn write_metadata(&self, meta: &MeditMetadata) -> Result<()>;

    /// All entries in `ctxt` with `begin <= at <= end`, ascending by `at`
    async fn query_range(&self, begin: i64, end: i64, ctxt: &str) -> Result<Vec<MeditMetadata>>;

    /// Remove an entry; removing a missing id is not an error
    async fn delete_metadata(&self, id: &str) -> Result<()>;
}

/// Metadata store backed by a DynamoDB table keyed by `id` with a secondary
/// index over `(ctxt, at)`
pub struct DynamoMetadataStore {
    client: DynamoClient,
    table: String,
    index_name: String,
}

impl DynamoMetadataStore {
    /// Create a new DynamoDB metadata store
    pub async fn new(config: &DynamoConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut dynamo_config_builder = DynamoConfigBuilder::from(&aws_config);

        // Configure custom endpoint for DynamoDB Local/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            dynamo_config_builder = dynamo_config_builder.endpoint_url(endpoint_url);
        }

        let client = DynamoClient::from_conf(dynamo_config_builder.build());

        info!(
            table = %config.table,
            index = %config.index_name,
            region = %config.region,
            "DynamoDB metadata store initialized"
        );

        Ok(Self {
            client,
            table: config.table.clone(),
            index_name: config.index_name.clone(),
        })
    }
}

#[async_trait]
impl MetadataStore for DynamoMetadataStore {
    #[instrument(skip(self, meta), fields(id = %meta.id))]
    async fn write_metadata(&self, meta: &MeditMetadata) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item("id", AttributeValue::S(meta.id.clone()))
            .item("ctxt", AttributeValue::S(meta.ctxt.clone()))
            .item("at", AttributeValue::N(meta.at.to_string()))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .context("Failed to write medit metadata to DynamoDB")?;

        debug!(table = %self.table, "Metadata written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_range(&self, begin: i64, end: i64, ctxt: &str) -> Result<Vec<MeditMetadata>> {
        // DynamoDB rejects BETWEEN with reversed bounds
        if begin > end {
            return Ok(Vec::new());
        }

        let items = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(&self.index_name)
            .key_condition_expression("ctxt = :ctxt AND #at BETWEEN :begin AND :end")
            .expression_attribute_names("#at", "at")
            .expression_attribute_values(":ctxt", AttributeValue::S(ctxt.to_string()))
            .expression_attribute_values(":begin", AttributeValue::N(begin.to_string()))
            .expression_attribute_values(":end", AttributeValue::N(end.to_string()))
            .scan_index_forward(true)
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .context("Failed to query medit metadata range")?;

        let rows = items
            .iter()
            .map(metadata_from_item)
            .collect::<Result<Vec<_>>>()?;

        debug!(count = rows.len(), "Metadata range queried");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete_metadata(&self, id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .context("Failed to delete medit metadata from DynamoDB")?;

        Ok(())
    }
}

fn metadata_from_item(item: &HashMap<String, AttributeValue>) -> Result<MeditMetadata> {
    let string_attr = |name: &str| -> Result<String> {
        item.get(name)
            .and_then(|value| value.as_s().ok())
            .cloned()
            .with_context(|| format!("Metadata item has no string attribute {name}"))
    };

    let at = item
        .get("at")
        .and_then(|value| value.as_n().ok())
        .context("Metadata item has no numeric attribute at")?
        .parse::<i64>()
        .context("Metadata attribute at is not an integer")?;

    Ok(MeditMetadata {
        id: string_attr("id")?,
        ctxt: string_attr("ctxt")?,
        at,
    })
}

/// Process-local metadata store
///
/// Entries with equal `at` come back in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    inner: RwLock<MemoryIndex>,
}

#[derive(Debug, Default)]
struct MemoryIndex {
    /// id -> index key
    by_id: HashMap<String, (String, i64, u64)>,
    /// (ctxt, at, insertion sequence) -> id
    by_ctxt_at: BTreeMap<(String, i64, u64), String>,
    next_seq: u64,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|index| index.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn write_metadata(&self, meta: &MeditMetadata) -> Result<()> {
        let mut index = self
            .inner
            .write()
            .map_err(|e| anyhow!("metadata lock poisoned: {e}"))?;

        if index.by_id.contains_key(&meta.id) {
            return Err(anyhow!("Metadata for {} already exists", meta.id));
        }

        let seq = index.next_seq;
        index.next_seq += 1;

        let key = (meta.ctxt.clone(), meta.at, seq);
        index.by_ctxt_at.insert(key.clone(), meta.id.clone());
        index.by_id.insert(meta.id.clone(), key);
        Ok(())
    }

    async fn query_range(&self, begin: i64, end: i64, ctxt: &str) -> Result<Vec<MeditMetadata>> {
        if begin > end {
            return Ok(Vec::new());
        }

        let index = self
            .inner
            .read()
            .map_err(|e| anyhow!("metadata lock poisoned: {e}"))?;

        let lower = (ctxt.to_string(), begin, u64::MIN);
        let upper = (ctxt.to_string(), end, u64::MAX);

        Ok(index
            .by_ctxt_at
            .range(lower..=upper)
            .map(|((ctxt, at, _), id)| MeditMetadata {
                id: id.clone(),
                ctxt: ctxt.clone(),
                at: *at,
            })
            .collect())
    }

    async fn delete_metadata(&self, id: &str) -> Result<()> {
        let mut index = self
            .inner
            .write()
            .map_err(|e| anyhow!("metadata lock poisoned: {e}"))?;

        if let Some(key) = index.by_id.remove(id) {
            index.by_ctxt_at.remove(&key);
        }
        Ok(())
    }
}
