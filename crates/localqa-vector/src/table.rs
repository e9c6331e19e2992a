//! LanceDB connection and housekeeping helpers.
//!
//! Opens the persisted database, checks for tables, and reads the key/value
//! `meta` table where the index builder records which encoder produced each
//! table (`embedder_id:<table>`). Nothing here writes to the index.
use arrow_array::StringArray;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};

use localqa_core::{Error, Result};

pub const META_TABLE: &str = "meta";

pub(crate) fn unavailable(e: impl std::fmt::Display) -> Error { Error::IndexUnavailable(e.to_string()) }

pub fn embedder_id_key(table: &str) -> String { format!("embedder_id:{}", table) }

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(|e| Error::IndexUnavailable(format!("cannot open index at {}: {}", uri, e)))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(unavailable)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? { return Ok(None); }
    let t = conn.open_table(table).execute().await.map_err(unavailable)?;
    let mut stream = t
        .query()
        .only_if(format!("key = '{}'", key.replace('\'', "''")))
        .execute()
        .await
        .map_err(unavailable)?;
    while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
        if batch.num_rows() == 0 { continue; }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| Error::IndexUnavailable("meta.value column missing".into()))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}
