//! Index-writing fixtures. The library only reads tables, so tests build
//! their own with the same layout the index builder uses.
#![allow(dead_code)]

use std::sync::Arc;

use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use lancedb::Connection;
use tempfile::TempDir;

use localqa_vector::table::{open_db, table_exists};

pub const DIM: i32 = 4;

/// (id, doc_path, content, vector) in insertion order.
pub fn rows() -> Vec<(&'static str, &'static str, &'static str, [f32; 4])> {
    vec![
        ("doc1:0", "doc1.txt", "X is a letter.", [1.0, 0.0, 0.0, 0.0]),
        ("doc2:0", "doc2.txt", "X follows W.", [0.9, 0.1, 0.0, 0.0]),
        ("doc3:0", "doc3.txt", "Unrelated text about boats.", [0.0, 1.0, 0.0, 0.0]),
        ("doc4:0", "doc4.txt", "X is a letter, again.", [1.0, 0.0, 0.0, 0.0]),
    ]
}

/// Document table layout with the vector width of the encoder.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("doc_path", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("total_chunks", DataType::Int32, false),
        Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

fn build_meta_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]))
}

/// Upsert `key = value` into the meta table, creating it on first use.
pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> anyhow::Result<()> {
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    if !table_exists(conn, table).await? {
        conn.create_table(table, reader).execute().await?;
        return Ok(());
    }
    let t = conn.open_table(table).execute().await?;
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await?;
    Ok(())
}

pub async fn seed_table(dir: &TempDir, table: &str) -> anyhow::Result<()> {
    let data = rows();
    let n = data.len();
    let batch = RecordBatch::try_new(
        build_arrow_schema(DIM),
        vec![
            Arc::new(StringArray::from(data.iter().map(|r| r.0.to_string()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(data.iter().map(|r| r.0.split(':').next().unwrap_or("").to_string()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(data.iter().map(|r| r.1.to_string()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(vec!["/test".to_string(); n])),
            Arc::new(StringArray::from(data.iter().map(|r| r.2.to_string()).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(vec![0; n])),
            Arc::new(Int32Array::from(vec![1; n])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                data.iter().map(|r| Some(r.3.iter().map(|x| Some(*x)).collect::<Vec<_>>())),
                DIM,
            )),
        ],
    )?;
    let conn = open_db(&dir.path().to_string_lossy()).await?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_arrow_schema(DIM)));
    conn.create_table(table, reader).execute().await?;
    Ok(())
}
