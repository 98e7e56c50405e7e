use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const VECTOR_COLUMN: &str = "vector";

/// One row per chunk; document metadata is denormalized so filters never join.
/// `vector` is nullable: rows without an embedding are stored but never searched.
pub fn build_chunks_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("chunk_id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("country", DataType::Utf8, false),
		Field::new("phase", DataType::Int32, true),
		Field::new("survey_type", DataType::Utf8, true),
		Field::new("doc_type", DataType::Utf8, false),
		Field::new("report_year", DataType::Int32, true),
		Field::new("title", DataType::Utf8, false),
		Field::new("online_url", DataType::Utf8, true),
		Field::new("text", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("start_offset", DataType::Int64, false),
		Field::new("char_length", DataType::Int64, false),
		Field::new("doc_fingerprint", DataType::Utf8, false),
		Field::new("indexed_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
