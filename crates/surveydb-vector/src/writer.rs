use arrow_array::{FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, RecordBatchReader, StringArray, TimestampMillisecondArray};
use arrow_schema::Schema;
use chrono::Utc;
use lancedb::Table;
use std::sync::Arc;

use surveydb_core::chunker::fingerprint_chunks;
use surveydb_core::error::{Error, Result};
use surveydb_core::types::Chunk;

use crate::table::sql_string;

/// Arrow batch for `chunks`; every row carries `fingerprint` and the same `indexed_at`.
pub fn chunks_to_record_batch(schema: Arc<Schema>, dim: usize, chunks: &[Chunk], fingerprint: &str) -> Result<RecordBatch> {
	let width = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("embedding dimension {dim} is too large")))?;
	let now = Utc::now().timestamp_millis();
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
	for c in chunks {
		match &c.embedding {
			Some(v) if v.len() != dim => return Err(Error::DimensionMismatch { provider: v.len(), stored: dim }),
			Some(v) => vectors.push(Some(v.iter().map(|&x| Some(x)).collect())),
			None => vectors.push(None),
		}
	}
	let text_col = |f: fn(&Chunk) -> String| StringArray::from(chunks.iter().map(f).collect::<Vec<_>>());
	let opt_text_col = |f: fn(&Chunk) -> Option<String>| StringArray::from(chunks.iter().map(f).collect::<Vec<_>>());
	RecordBatch::try_new(schema, vec![
		Arc::new(text_col(|c| c.chunk_id.clone())),
		Arc::new(text_col(|c| c.metadata.doc_id.clone())),
		Arc::new(text_col(|c| c.metadata.country.clone())),
		Arc::new(Int32Array::from(chunks.iter().map(|c| c.metadata.phase.map(|p| p as i32)).collect::<Vec<_>>())),
		Arc::new(opt_text_col(|c| c.metadata.survey_type.map(|t| t.as_str().to_string()))),
		Arc::new(text_col(|c| c.metadata.doc_type.as_str().to_string())),
		Arc::new(Int32Array::from(chunks.iter().map(|c| c.metadata.year).collect::<Vec<_>>())),
		Arc::new(text_col(|c| c.metadata.title.clone())),
		Arc::new(opt_text_col(|c| c.metadata.online_url.clone())),
		Arc::new(text_col(|c| c.text.clone())),
		Arc::new(Int32Array::from(chunks.iter().map(|c| c.chunk_index as i32).collect::<Vec<_>>())),
		Arc::new(Int64Array::from(chunks.iter().map(|c| c.start_offset as i64).collect::<Vec<_>>())),
		Arc::new(Int64Array::from(chunks.iter().map(|c| c.char_length as i64).collect::<Vec<_>>())),
		Arc::new(StringArray::from(vec![fingerprint.to_string(); chunks.len()])),
		Arc::new(TimestampMillisecondArray::from(vec![now; chunks.len()])),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), width)),
	])
	.map_err(Error::storage)
}

fn reader(schema: Arc<Schema>, batches: Vec<RecordBatch>) -> Box<dyn RecordBatchReader + Send> {
	Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema))
}

/// Insert or overwrite rows by `chunk_id`. Each document's rows are stamped
/// with the fingerprint of the chunks given for it here.
pub async fn upsert_chunks(table: &Table, schema: Arc<Schema>, dim: usize, chunks: &[Chunk]) -> Result<()> {
	if chunks.is_empty() { return Ok(()); }
	let mut batches = Vec::new();
	let mut start = 0;
	while start < chunks.len() {
		let doc_id = chunks[start].doc_id();
		let end = chunks[start..].iter().position(|c| c.doc_id() != doc_id).map_or(chunks.len(), |n| start + n);
		let group = &chunks[start..end];
		batches.push(chunks_to_record_batch(schema.clone(), dim, group, &fingerprint_chunks(group))?);
		start = end;
	}
	let mut mi = table.merge_insert(&["chunk_id"]);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	mi.execute(reader(schema, batches)).await.map_err(Error::storage)?;
	Ok(())
}

/// Swap a document's rows in one commit: new rows are upserted and the
/// document's rows missing from the new set are deleted.
pub async fn replace_document_rows(table: &Table, schema: Arc<Schema>, dim: usize, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
	if let Some(stray) = chunks.iter().find(|c| c.doc_id() != doc_id) {
		return Err(Error::Operation(format!("chunk {} does not belong to document {doc_id}", stray.chunk_id)));
	}
	let predicate = format!("doc_id = {}", sql_string(doc_id));
	if chunks.is_empty() {
		table.delete(&predicate).await.map_err(Error::storage)?;
		return Ok(());
	}
	let batch = chunks_to_record_batch(schema.clone(), dim, chunks, &fingerprint_chunks(chunks))?;
	let mut mi = table.merge_insert(&["chunk_id"]);
	mi.when_matched_update_all(None).when_not_matched_insert_all().when_not_matched_by_source_delete(Some(predicate));
	mi.execute(reader(schema, vec![batch])).await.map_err(Error::storage)?;
	Ok(())
}

pub async fn delete_document_rows(table: &Table, doc_id: &str) -> Result<()> {
	table.delete(&format!("doc_id = {}", sql_string(doc_id))).await.map_err(Error::storage)?;
	Ok(())
}
