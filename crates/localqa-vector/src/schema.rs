//! Column layout of the pre-built `documents` table.
//!
//! The index builder writes one row per passage; this crate only reads
//! `id`, `content`, the source column and `vector`. Every other Utf8 or
//! integer column is carried through as passage metadata.

use arrow_schema::{DataType, Schema};

use localqa_core::{Error, Result};

pub const ID_COLUMN: &str = "id";
pub const TEXT_COLUMN: &str = "content";
pub const VECTOR_COLUMN: &str = "vector";
/// Checked in order; the first one present becomes the passage `source`.
pub const SOURCE_COLUMNS: &[&str] = &["source", "doc_path"];
pub const DISTANCE_COLUMN: &str = "_distance";
pub const ROW_ID_COLUMN: &str = "_rowid";

/// Width of the `vector` column, which must be a fixed-size float list.
pub fn vector_dim(schema: &Schema) -> Result<usize> {
	let field = schema
		.field_with_name(VECTOR_COLUMN)
		.map_err(|_| Error::IndexUnavailable(format!("no '{}' column in index table", VECTOR_COLUMN)))?;
	match field.data_type() {
		DataType::FixedSizeList(item, size) if matches!(item.data_type(), DataType::Float32 | DataType::Float16) => Ok(*size as usize),
		other => Err(Error::IndexUnavailable(format!("'{}' column has type {:?}, expected a fixed-size float list", VECTOR_COLUMN, other))),
	}
}

pub fn require_columns(schema: &Schema) -> Result<()> {
	for name in [ID_COLUMN, TEXT_COLUMN] {
		if schema.field_with_name(name).is_err() {
			return Err(Error::IndexUnavailable(format!("no '{}' column in index table", name)));
		}
	}
	if !SOURCE_COLUMNS.iter().any(|c| schema.field_with_name(c).is_ok()) {
		tracing::warn!(candidates = ?SOURCE_COLUMNS, "index table has no source column; citations will have empty sources");
	}
	Ok(())
}
