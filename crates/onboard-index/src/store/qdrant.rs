//! `Qdrant`-backed store using one collection per corpus generation.
//!
//! A replacement writes a fresh `{base}_{generation}` collection, switches
//! searches to it, then drops the previous one. A failed write drops the
//! partial collection and leaves the active generation untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};

use super::{ScoredChunk, VectorStore};
use crate::chunk::{Chunk, ChunkId, ChunkKind, EmbeddedChunk};
use crate::error::StoreError;
use crate::languages::Lang;

const UPSERT_BATCH: usize = 256;

#[derive(Debug, Clone)]
struct ActiveCollection {
    name: String,
    points: usize,
}

pub struct QdrantStore {
    client: Qdrant,
    base: String,
    dimension: u64,
    generation: AtomicU64,
    active: RwLock<Option<ActiveCollection>>,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("base", &self.base)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// # Errors
    ///
    /// Returns an error if the `Qdrant` client cannot be created.
    pub fn new(url: &str, base_collection: &str, dimension: usize) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url).build()?;
        // generations are unique across restarts so stale collections never collide
        let first_generation =
            u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Ok(Self {
            client,
            base: base_collection.to_owned(),
            dimension: u64::try_from(dimension)?,
            generation: AtomicU64::new(first_generation),
            active: RwLock::new(None),
        })
    }

    fn active(&self) -> Option<ActiveCollection> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn write_generation(
        &self,
        collection: &str,
        entries: &[EmbeddedChunk],
    ) -> Result<(), StoreError> {
        if self.client.collection_exists(collection).await? {
            self.client.delete_collection(collection).await?;
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
            )
            .await?;

        for batch in entries.chunks(UPSERT_BATCH) {
            let points = batch.iter().map(to_point).collect::<Result<Vec<_>, _>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
                .await?;
        }
        Ok(())
    }
}

impl VectorStore for QdrantStore {
    async fn replace_all(&self, entries: Vec<EmbeddedChunk>) -> Result<u64, StoreError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let collection = format!("{}_{generation}", self.base);

        if let Err(err) = self.write_generation(&collection, &entries).await {
            tracing::error!(collection = %collection, error = %err, "qdrant write failed, keeping previous generation");
            if let Err(cleanup) = self.client.delete_collection(collection.as_str()).await {
                tracing::warn!(collection = %collection, error = %cleanup, "failed to drop partial collection");
            }
            return Err(err);
        }

        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveCollection {
                name: collection.clone(),
                points: entries.len(),
            });
        tracing::info!(collection = %collection, points = entries.len(), "qdrant generation active");

        if let Some(previous) = previous
            && let Err(err) = self.client.delete_collection(previous.name.as_str()).await
        {
            tracing::warn!(collection = %previous.name, error = %err, "failed to drop previous generation");
        }
        Ok(generation)
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        let Some(active) = self.active() else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&active.name, query.to_vec(), u64::try_from(limit)?)
                    .with_payload(true),
            )
            .await?;

        response
            .result
            .iter()
            .map(|point| {
                Ok(ScoredChunk {
                    chunk: chunk_from_point(point)?,
                    score: point.score,
                })
            })
            .collect()
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.active().map_or(0, |a| a.points))
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

/// Qdrant point id for a chunk: the id itself when it is a UUID, otherwise a
/// UUID built from its hash.
fn point_id(id: &ChunkId) -> String {
    id.as_uuid()
        .unwrap_or_else(|| {
            let hash = blake3::hash(id.as_str().as_bytes());
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&hash.as_bytes()[..16]);
            uuid::Uuid::from_bytes(bytes)
        })
        .to_string()
}

fn to_point(entry: &EmbeddedChunk) -> Result<PointStruct, StoreError> {
    let chunk = &entry.chunk;
    let payload: HashMap<String, Value> = serde_json::from_value(serde_json::json!({
        "id": chunk.id.as_str(),
        "content": chunk.content,
        "file_path": chunk.file_path,
        "start_line": chunk.start_line,
        "end_line": chunk.end_line,
        "overlap_lines": chunk.overlap_lines,
        "language": chunk.language.id(),
        "chunk_kind": chunk.kind.as_str(),
        "name": chunk.name,
        "metadata": serde_json::to_string(&chunk.metadata)?,
        "content_hash": chunk.content_hash,
        "model": entry.model,
        "created_at": entry.created_at.to_rfc3339(),
    }))?;
    Ok(PointStruct::new(
        point_id(&chunk.id),
        entry.vector.clone(),
        payload,
    ))
}

fn chunk_from_point(point: &ScoredPoint) -> Result<Chunk, StoreError> {
    let p = &point.payload;
    let point_label = p
        .get("id")
        .and_then(Value::as_str)
        .cloned()
        .unwrap_or_else(|| "<unknown>".to_owned());
    let missing = |field: &'static str| StoreError::InvalidPayload {
        point: point_label.clone(),
        field,
    };
    let get_str = |key: &'static str| p.get(key).and_then(Value::as_str).cloned();
    let get_int = |key: &'static str| {
        p.get(key)
            .and_then(Value::as_integer)
            .and_then(|v| usize::try_from(v).ok())
    };

    let metadata = match get_str("metadata") {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Default::default(),
    };

    Ok(Chunk {
        id: ChunkId::from_raw(get_str("id").ok_or_else(|| missing("id"))?),
        content: get_str("content").ok_or_else(|| missing("content"))?,
        file_path: get_str("file_path").ok_or_else(|| missing("file_path"))?,
        start_line: get_int("start_line").ok_or_else(|| missing("start_line"))?,
        end_line: get_int("end_line").ok_or_else(|| missing("end_line"))?,
        overlap_lines: get_int("overlap_lines").unwrap_or(0),
        language: get_str("language")
            .and_then(|tag| Lang::from_tag(&tag))
            .unwrap_or(Lang::PlainText),
        kind: get_str("chunk_kind")
            .and_then(|tag| ChunkKind::from_tag(&tag))
            .ok_or_else(|| missing("chunk_kind"))?,
        name: get_str("name"),
        metadata,
        content_hash: get_str("content_hash").unwrap_or_default(),
    })
}
