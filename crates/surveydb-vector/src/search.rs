use arrow_array::cast::AsArray;
use arrow_array::types::{Int32Type, Int64Type};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};

use surveydb_core::error::{Error, Result};
use surveydb_core::types::{sort_scored, Chunk, DocType, DocumentMetadata, MetadataFilter, ScoredChunk, SurveyType};

use crate::schema::VECTOR_COLUMN;
use crate::table::sql_string;

/// Columns needed to rebuild a [`Chunk`]; vectors are never read back.
const CHUNK_COLUMNS: &[&str] = &[
	"chunk_id", "doc_id", "country", "phase", "survey_type", "doc_type", "report_year",
	"title", "online_url", "text", "chunk_index", "start_offset", "char_length",
];

/// SQL pre-filter equivalent to [`MetadataFilter::matches`]. Rows without a
/// vector are always excluded. `IN` against a NULL column is never true, so a
/// missing attribute fails its predicate here too.
pub fn filter_to_sql(filter: &MetadataFilter) -> String {
	let mut parts = vec![format!("{VECTOR_COLUMN} IS NOT NULL")];
	if let Some(countries) = &filter.countries {
		parts.push(in_list("country", countries.iter().map(|c| sql_string(c))));
	}
	if let Some(phases) = &filter.phases {
		parts.push(in_list("phase", phases.iter().map(u32::to_string)));
	}
	if let Some(types) = &filter.survey_types {
		parts.push(in_list("survey_type", types.iter().map(|t| sql_string(t.as_str()))));
	}
	if let Some((lo, hi)) = filter.year_range {
		parts.push(format!("(report_year >= {lo} AND report_year <= {hi})"));
	}
	parts.join(" AND ")
}

fn in_list(column: &str, values: impl Iterator<Item = String>) -> String {
	let values: Vec<String> = values.collect();
	if values.is_empty() { return "FALSE".into(); }
	format!("{column} IN ({})", values.join(", "))
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| Error::Storage(format!("missing {name}")))
}

fn opt_string(col: &StringArray, i: usize) -> Option<String> {
	col.is_valid(i).then(|| col.value(i).to_string())
}

/// Decode rows into chunks (without embeddings).
pub fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let chunk_id = string_col(batch, "chunk_id")?;
	let doc_id = string_col(batch, "doc_id")?;
	let country = string_col(batch, "country")?;
	let survey_type = string_col(batch, "survey_type")?;
	let doc_type = string_col(batch, "doc_type")?;
	let title = string_col(batch, "title")?;
	let online_url = string_col(batch, "online_url")?;
	let text = string_col(batch, "text")?;
	let int32 = |name: &str| batch.column_by_name(name).and_then(|c| c.as_primitive_opt::<Int32Type>()).ok_or_else(|| Error::Storage(format!("missing {name}")));
	let int64 = |name: &str| batch.column_by_name(name).and_then(|c| c.as_primitive_opt::<Int64Type>()).ok_or_else(|| Error::Storage(format!("missing {name}")));
	let phase = int32("phase")?;
	let year = int32("report_year")?;
	let chunk_index = int32("chunk_index")?;
	let start_offset = int64("start_offset")?;
	let char_length = int64("char_length")?;

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let survey_type = match opt_string(survey_type, i) { Some(s) => Some(s.parse::<SurveyType>()?), None => None };
		let metadata = DocumentMetadata {
			doc_id: doc_id.value(i).to_string(),
			country: country.value(i).to_string(),
			phase: phase.is_valid(i).then(|| phase.value(i) as u32),
			survey_type,
			doc_type: doc_type.value(i).parse::<DocType>()?,
			year: year.is_valid(i).then(|| year.value(i)),
			title: title.value(i).to_string(),
			online_url: opt_string(online_url, i),
		};
		out.push(Chunk {
			chunk_id: chunk_id.value(i).to_string(),
			chunk_index: chunk_index.value(i) as usize,
			text: text.value(i).to_string(),
			start_offset: start_offset.value(i) as usize,
			char_length: char_length.value(i) as usize,
			embedding: None,
			metadata,
		});
	}
	Ok(out)
}

/// Exact cosine search over rows passing `filter`, best first.
///
/// The filter runs before the top-k cut. LanceDB orders equal distances
/// arbitrarily, so the fetch window grows until it holds every row tied with
/// the k-th score; ties are then broken by chunk id.
pub async fn search_chunks(table: &Table, query_vec: &[f32], filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>> {
	if k == 0 { return Ok(Vec::new()); }
	let predicate = filter_to_sql(filter);
	let mut fetch = k.saturating_mul(2).max(k + 8);
	loop {
		let mut hits = fetch_nearest(table, query_vec, &predicate, fetch).await?;
		sort_scored(&mut hits);
		let window_full = hits.len() == fetch;
		if window_full && hits[fetch - 1].score == hits[k - 1].score {
			fetch = fetch.saturating_mul(2);
			continue;
		}
		hits.truncate(k);
		return Ok(hits);
	}
}

async fn fetch_nearest(table: &Table, query_vec: &[f32], predicate: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
	let mut stream = table
		.vector_search(query_vec.to_vec())
		.map_err(Error::storage)?
		.column(VECTOR_COLUMN)
		.distance_type(DistanceType::Cosine)
		.bypass_vector_index()
		.only_if(predicate)
		.select(Select::columns(CHUNK_COLUMNS))
		.limit(limit)
		.execute()
		.await
		.map_err(Error::storage)?;
	let mut hits = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
		let distance = batch
			.column_by_name("_distance")
			.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
			.ok_or_else(|| Error::Storage("missing _distance".into()))?;
		for (i, chunk) in batch_to_chunks(&batch)?.into_iter().enumerate() {
			hits.push(ScoredChunk { chunk, score: 1.0 - distance.value(i) });
		}
	}
	Ok(hits)
}

/// Every stored chunk, vectors omitted, ordered by chunk id.
pub async fn scan_chunks(table: &Table) -> Result<Vec<Chunk>> {
	let mut stream = table.query().select(Select::columns(CHUNK_COLUMNS)).execute().await.map_err(Error::storage)?;
	let mut chunks = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
		chunks.extend(batch_to_chunks(&batch)?);
	}
	chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
	Ok(chunks)
}

pub async fn fingerprint_of(table: &Table, doc_id: &str) -> Result<Option<String>> {
	let mut stream = table
		.query()
		.only_if(format!("doc_id = {}", sql_string(doc_id)))
		.select(Select::columns(&["doc_fingerprint"]))
		.limit(1)
		.execute()
		.await
		.map_err(Error::storage)?;
	while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
		if batch.num_rows() == 0 { continue; }
		return Ok(Some(string_col(&batch, "doc_fingerprint")?.value(0).to_string()));
	}
	Ok(None)
}
