//! LanceDB-backed vector index.
//!
//! The table is opened once at startup. Searches run on the tokio runtime
//! that opened it via a stored [`Handle`], so the sync [`VectorIndex`] methods
//! must be called from a blocking context (`spawn_blocking` or a plain thread),
//! never directly from an async task.

use std::cmp::Ordering;

use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::DataType;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tokio::runtime::Handle;

use localqa_core::config::{DistanceMetric, PipelineConfig};
use localqa_core::traits::VectorIndex;
use localqa_core::types::{Meta, PassageVector, RankedPassage, SOURCE_KEY};
use localqa_core::{Error, Result};

use crate::schema::{self, DISTANCE_COLUMN, ID_COLUMN, ROW_ID_COLUMN, SOURCE_COLUMNS, TEXT_COLUMN, VECTOR_COLUMN};
use crate::table::{embedder_id_key, get_meta, open_db, table_exists, unavailable, META_TABLE};
use crate::similarity_from_distance;

pub struct LanceVectorIndex {
    table: Table,
    table_name: String,
    dim: usize,
    metric: DistanceMetric,
    nprobes: Option<usize>,
    refine_factor: Option<u32>,
    recorded_embedder: Option<String>,
    handle: Handle,
}

struct Hit {
    row_id: u64,
    score: f32,
    passage: PassageVector,
}

impl LanceVectorIndex {
    /// Open `persist_directory/table_name`. Must be awaited inside the runtime
    /// that will later serve the blocking searches.
    pub async fn open(config: &PipelineConfig) -> Result<Self> {
        let conn = open_db(&config.persist_directory).await?;
        if !table_exists(&conn, &config.table_name).await? {
            return Err(Error::IndexUnavailable(format!(
                "table '{}' not found in {}",
                config.table_name, config.persist_directory
            )));
        }
        let table = conn.open_table(&config.table_name).execute().await.map_err(unavailable)?;
        let table_schema = table.schema().await.map_err(unavailable)?;
        schema::require_columns(&table_schema)?;
        let dim = schema::vector_dim(&table_schema)?;

        // Compared against the live encoder's id by `Retriever::new`.
        let recorded_embedder = get_meta(&conn, META_TABLE, &embedder_id_key(&config.table_name)).await?;
        let rows = table.count_rows(None).await.map_err(unavailable)?;
        tracing::info!(path = %config.persist_directory, table = %config.table_name, dim, rows, metric = ?config.distance_metric, "vector index opened");

        Ok(Self {
            table,
            table_name: config.table_name.clone(),
            dim,
            metric: config.distance_metric,
            nprobes: config.nprobes,
            refine_factor: config.refine_factor,
            recorded_embedder,
            handle: Handle::current(),
        })
    }

    pub fn table_name(&self) -> &str { &self.table_name }

    pub async fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<RankedPassage>> {
        if query_vec.len() != self.dim {
            return Err(Error::Encoding(format!("query vector has {} values, index expects {}", query_vec.len(), self.dim)));
        }
        let k = k.max(1);
        // Cosine against a zero vector is undefined; rank by plain distance instead.
        let metric = if self.metric == DistanceMetric::Cosine && query_vec.iter().all(|x| *x == 0.0) {
            DistanceMetric::L2
        } else {
            self.metric
        };

        let mut query = self
            .table
            .vector_search(query_vec.to_vec())
            .map_err(unavailable)?
            .column(VECTOR_COLUMN)
            .distance_type(distance_type(metric))
            .limit(k)
            .with_row_id();
        if let Some(n) = self.nprobes { query = query.nprobes(n); }
        if let Some(r) = self.refine_factor { query = query.refine_factor(r); }

        let mut stream = query.execute().await.map_err(unavailable)?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
            read_hits(&batch, metric, &mut hits)?;
        }
        hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.row_id.cmp(&b.row_id),
            other => other,
        });
        hits.truncate(k);
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, h)| RankedPassage { passage: h.passage, rank, score: h.score })
            .collect())
    }
}

impl VectorIndex for LanceVectorIndex {
    fn dim(&self) -> usize { self.dim }

    fn len(&self) -> Result<usize> {
        self.handle.block_on(self.table.count_rows(None)).map_err(unavailable)
    }

    fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<RankedPassage>> {
        self.handle.block_on(self.search(query_vec, k))
    }

    fn recorded_embedder(&self) -> Option<&str> { self.recorded_embedder.as_deref() }
}

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::L2 => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::IndexUnavailable(format!("search result has no Utf8 '{}' column", name)))
}

fn read_hits(batch: &RecordBatch, metric: DistanceMetric, out: &mut Vec<Hit>) -> Result<()> {
    let ids = string_column(batch, ID_COLUMN)?;
    let texts = string_column(batch, TEXT_COLUMN)?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| Error::IndexUnavailable("search result has no _distance column".into()))?;
    let row_ids = batch.column_by_name(ROW_ID_COLUMN).and_then(|c| c.as_any().downcast_ref::<UInt64Array>());
    let source_col = SOURCE_COLUMNS.iter().find_map(|name| {
        batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).map(|a| (*name, a))
    });
    let vectors = batch.column_by_name(VECTOR_COLUMN).and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());
    let schema = batch.schema();

    for i in 0..batch.num_rows() {
        let mut metadata = Meta::new();
        for (col, field) in batch.columns().iter().zip(schema.fields().iter()) {
            let name = field.name().as_str();
            if [ID_COLUMN, TEXT_COLUMN, VECTOR_COLUMN, DISTANCE_COLUMN, ROW_ID_COLUMN].contains(&name) { continue; }
            if source_col.is_some_and(|(s, _)| s == name) || col.is_null(i) { continue; }
            let value = match field.data_type() {
                DataType::Utf8 => col.as_any().downcast_ref::<StringArray>().map(|a| a.value(i).to_string()),
                DataType::Int32 => col.as_any().downcast_ref::<Int32Array>().map(|a| a.value(i).to_string()),
                DataType::Int64 => col.as_any().downcast_ref::<Int64Array>().map(|a| a.value(i).to_string()),
                _ => None,
            };
            if let Some(v) = value { metadata.insert(name.to_string(), v); }
        }
        let source = source_col.map(|(_, a)| a.value(i).to_string()).unwrap_or_default();
        metadata.insert(SOURCE_KEY.to_string(), source);

        let vector = vectors
            .and_then(|v| v.value(i).as_any().downcast_ref::<Float32Array>().map(|f| f.values().to_vec()))
            .unwrap_or_default();
        let score = similarity_from_distance(metric, distances.value(i));
        out.push(Hit {
            // Without row ids, arrival order stands in for insertion order.
            row_id: row_ids.map(|r| r.value(i)).unwrap_or(out.len() as u64),
            score,
            passage: PassageVector { id: ids.value(i).to_string(), text: texts.value(i).to_string(), metadata, vector },
        });
    }
    Ok(())
}
