//! LanceDB-backed vector store. One table per collection; collections map
//! one-to-one onto apps. Vectors are L2-normalized at embedding time, so
//! cosine distance over them equals inner product.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::storage::StoredChunk;
use crate::types::ChunkMetadata;

pub struct LanceStore {
    db: lancedb::Connection,
    uri: String,
    dimension: usize,
    embedder_tag: String,
}

/// A hydrated row from the store. `score` is cosine similarity for vector
/// queries and 0 for plain lookups.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub cid: String,
    pub preview: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

impl LanceStore {
    pub async fn connect(uri: &str, dimension: usize, embedder_tag: &str) -> Result<Self> {
        std::fs::create_dir_all(uri).ok();
        let db = lancedb::connect(uri)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            uri: uri.to_string(),
            dimension,
            embedder_tag: embedder_tag.to_string(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("preview", DataType::Utf8, false),
            Field::new("app", DataType::Utf8, false),
            Field::new("source_path", DataType::Utf8, false),
            Field::new("section_title", DataType::Utf8, false),
            Field::new("seq_idx", DataType::UInt32, false),
            Field::new("ingested_at", DataType::Utf8, false),
            Field::new("hash", DataType::Utf8, false),
            // u64 SimHash, bit-cast; Arrow has no unsigned 64-bit Utf8-free fit
            // that LanceDB predicates handle as cleanly.
            Field::new("simhash", DataType::Int64, false),
            Field::new("hierarchy_json", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
        ]))
    }

    pub async fn has_collection(&self, name: &str) -> bool {
        match self.db.table_names().execute().await {
            Ok(names) => names.iter().any(|n| n == name),
            Err(_) => false,
        }
    }

    /// Create the collection table if missing and record its metadata
    /// (embedder tag, space type) alongside the database.
    pub async fn ensure_collection(&self, name: &str) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.iter().any(|n| n == name) {
            // Create with a single seed record, then delete it.
            let schema = self.schema();
            let seed_vec = vec![0.0f32; self.dimension];
            let values = Float32Array::from(seed_vec);
            let vector_array = FixedSizeListArray::new(
                Arc::new(Field::new("item", DataType::Float32, true)),
                self.dimension as i32,
                Arc::new(values) as Arc<dyn Array>,
                None,
            );

            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(UInt32Array::from(vec![0u32])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(StringArray::from(vec![""])),
                    Arc::new(Int64Array::from(vec![0i64])),
                    Arc::new(StringArray::from(vec!["{}"])),
                    Arc::new(vector_array) as Arc<dyn Array>,
                ],
            )
            .context("Failed to create seed RecordBatch")?;

            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(name, Box::new(batches))
                .execute()
                .await
                .with_context(|| format!("Failed to create collection '{name}'"))?;

            let table = self.db.open_table(name).execute().await?;
            table.delete("id = '__seed__'").await.ok();
        }

        self.record_collection_meta(name)?;
        Ok(())
    }

    /// Sidecar metadata: which embedder produced the vectors and the distance
    /// space they expect. Read by operators, not the query path.
    fn record_collection_meta(&self, name: &str) -> Result<()> {
        let path = PathBuf::from(&self.uri).join("collections.json");
        let mut meta: BTreeMap<String, serde_json::Value> = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        meta.insert(
            name.to_string(),
            serde_json::json!({
                "embedder": self.embedder_tag,
                "space": "cosine",
                "dimension": self.dimension,
            }),
        );
        let body = serde_json::to_string_pretty(&meta).context("Failed to encode collection metadata")?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub async fn add_chunks(&self, collection: &str, chunks: &[StoredChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        for chunk in chunks {
            if chunk.vector.len() != self.dimension {
                anyhow::bail!(
                    "Embedding dimension {} disagrees with store dimension {} (cid {})",
                    chunk.vector.len(),
                    self.dimension,
                    chunk.cid
                );
            }
        }

        let table = self
            .db
            .open_table(collection)
            .execute()
            .await
            .with_context(|| format!("Failed to open collection '{collection}'"))?;

        let schema = self.schema();

        let ids: Vec<&str> = chunks.iter().map(|c| c.cid.as_str()).collect();
        let previews: Vec<&str> = chunks.iter().map(|c| c.preview.as_str()).collect();
        let apps: Vec<&str> = chunks.iter().map(|c| c.metadata.app.as_str()).collect();
        let source_paths: Vec<&str> =
            chunks.iter().map(|c| c.metadata.source_path.as_str()).collect();
        let section_titles: Vec<&str> =
            chunks.iter().map(|c| c.metadata.section_title.as_str()).collect();
        let seq_idxs: Vec<u32> = chunks.iter().map(|c| c.metadata.seq_idx).collect();
        let ingested_ats: Vec<&str> =
            chunks.iter().map(|c| c.metadata.ingested_at.as_str()).collect();
        let hashes: Vec<&str> = chunks.iter().map(|c| c.metadata.hash.as_str()).collect();
        let simhashes: Vec<i64> = chunks.iter().map(|c| c.metadata.simhash as i64).collect();
        let hierarchy_jsons: Vec<String> = chunks
            .iter()
            .map(|c| serde_json::to_string(&c.metadata.hierarchy).unwrap_or_else(|_| "{}".into()))
            .collect();

        let flat_vectors: Vec<f32> = chunks.iter().flat_map(|c| c.vector.iter().copied()).collect();
        let values = Float32Array::from(flat_vectors);
        let vector_array = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(previews)),
                Arc::new(StringArray::from(apps)),
                Arc::new(StringArray::from(source_paths)),
                Arc::new(StringArray::from(section_titles)),
                Arc::new(UInt32Array::from(seq_idxs)),
                Arc::new(StringArray::from(ingested_ats)),
                Arc::new(StringArray::from(hashes)),
                Arc::new(Int64Array::from(simhashes)),
                Arc::new(StringArray::from(
                    hierarchy_jsons.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                )),
                Arc::new(vector_array) as Arc<dyn Array>,
            ],
        )
        .context("Failed to create RecordBatch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .with_context(|| format!("Failed to insert chunks into '{collection}'"))?;

        tracing::debug!(collection, rows = chunks.len(), "Inserted chunks into LanceDB");
        Ok(())
    }

    /// Top-n by cosine similarity, best first.
    pub async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n: usize,
    ) -> Result<Vec<VectorHit>> {
        let table = self
            .db
            .open_table(collection)
            .execute()
            .await
            .with_context(|| format!("Failed to open collection '{collection}'"))?;

        let results = table
            .query()
            .nearest_to(embedding)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(n)
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_hits(&batches))
    }

    /// Fetch rows by id. Order is whatever the store returns; callers that
    /// care about ordering re-sort against their request.
    pub async fn get_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<VectorHit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let table = self
            .db
            .open_table(collection)
            .execute()
            .await
            .with_context(|| format!("Failed to open collection '{collection}'"))?;

        let mut all_hits = Vec::new();
        // Batched predicates keep the SQL short.
        for group in ids.chunks(50) {
            let id_list: Vec<String> = group
                .iter()
                .map(|id| format!("'{}'", id.replace('\'', "''")))
                .collect();
            let predicate = format!("id IN ({})", id_list.join(", "));

            let results = table
                .query()
                .only_if(predicate)
                .execute()
                .await
                .context("LanceDB id lookup failed")?;

            let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
            all_hits.extend(extract_hits(&batches));
        }

        Ok(all_hits)
    }

    pub async fn count(&self, collection: &str) -> Result<usize> {
        let table = self.db.open_table(collection).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

/// Extract hydrated hits from Arrow record batches. Shared by the vector
/// query and the id lookup so column handling stays in one place.
fn extract_hits(batches: &[RecordBatch]) -> Vec<VectorHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let str_col = |name: &str| {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        };

        let ids = str_col("id");
        let previews = str_col("preview");
        let apps = str_col("app");
        let source_paths = str_col("source_path");
        let section_titles = str_col("section_title");
        let ingested_ats = str_col("ingested_at");
        let hashes = str_col("hash");
        let hierarchy_jsons = str_col("hierarchy_json");
        let seq_idxs = batch
            .column_by_name("seq_idx")
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let simhashes = batch
            .column_by_name("simhash")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(previews), Some(apps), Some(source_paths)) =
            (ids, previews, apps, source_paths)
        else {
            continue;
        };

        for i in 0..batch.num_rows() {
            let score = distances.map(|d| (1.0 - d.value(i)).max(0.0)).unwrap_or(0.0);
            let hierarchy = hierarchy_jsons
                .map(|h| serde_json::from_str(h.value(i)).unwrap_or_default())
                .unwrap_or_default();

            hits.push(VectorHit {
                cid: ids.value(i).to_string(),
                preview: previews.value(i).to_string(),
                metadata: ChunkMetadata {
                    app: apps.value(i).to_string(),
                    source_path: source_paths.value(i).to_string(),
                    section_title: section_titles.map(|s| s.value(i).to_string()).unwrap_or_default(),
                    seq_idx: seq_idxs.map(|s| s.value(i)).unwrap_or(0),
                    ingested_at: ingested_ats.map(|s| s.value(i).to_string()).unwrap_or_default(),
                    hash: hashes.map(|s| s.value(i).to_string()).unwrap_or_default(),
                    simhash: simhashes.map(|s| s.value(i) as u64).unwrap_or(0),
                    hierarchy,
                },
                score,
            });
        }
    }
    hits
}
