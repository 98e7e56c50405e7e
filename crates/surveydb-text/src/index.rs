use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tantivy::tokenizer::TextAnalyzer;
use tracing::{debug, info};

use surveydb_core::config::Bm25Settings;
use surveydb_core::error::{Error, Result};
use surveydb_core::types::{sort_scored, Chunk, MetadataFilter, ScoredChunk};

use crate::tantivy_utils::{build_analyzer, tokenize};

/// Immutable BM25 statistics over one corpus generation.
struct Snapshot {
	chunks: Vec<Chunk>,
	doc_len: Vec<f32>,
	avg_len: f32,
	/// term -> (chunk position, term frequency)
	postings: HashMap<String, Vec<(usize, u32)>>,
}

impl Snapshot {
	fn build(analyzer: &mut TextAnalyzer, chunks: Vec<Chunk>) -> Self {
		let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
		let mut doc_len = Vec::with_capacity(chunks.len());
		for (pos, chunk) in chunks.iter().enumerate() {
			let terms = tokenize(analyzer, &chunk.text);
			doc_len.push(terms.len() as f32);
			let mut tf: HashMap<String, u32> = HashMap::new();
			for t in terms { *tf.entry(t).or_insert(0) += 1; }
			for (term, freq) in tf { postings.entry(term).or_default().push((pos, freq)); }
		}
		let avg_len = if doc_len.is_empty() { 0.0 } else { doc_len.iter().sum::<f32>() / doc_len.len() as f32 };
		Self { chunks, doc_len, avg_len, postings }
	}

	fn idf(&self, df: usize) -> f32 {
		let n = self.chunks.len() as f32;
		let df = df as f32;
		(1.0 + (n - df + 0.5) / (df + 0.5)).ln()
	}
}

/// In-memory BM25 keyword index over the chunk corpus.
///
/// `build`/`rebuild` compute a fresh snapshot without holding the lock and then
/// swap it in, so concurrent searches see either the old or the new corpus.
pub struct KeywordIndex {
	params: Bm25Settings,
	analyzer: TextAnalyzer,
	snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl KeywordIndex {
	pub fn new(params: Bm25Settings) -> Result<Self> {
		params.validate()?;
		Ok(Self { params, analyzer: build_analyzer()?, snapshot: RwLock::new(None) })
	}

	pub fn build(&self, chunks: Vec<Chunk>) {
		let mut analyzer = self.analyzer.clone();
		let snapshot = Arc::new(Snapshot::build(&mut analyzer, chunks));
		info!(chunks = snapshot.chunks.len(), terms = snapshot.postings.len(), "BM25 index built");
		let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
		*guard = Some(snapshot);
	}

	/// Same as [`build`](Self::build); kept as a separate name for call sites that refresh after ingestion.
	pub fn rebuild(&self, chunks: Vec<Chunk>) {
		self.build(chunks)
	}

	pub fn is_ready(&self) -> bool {
		self.current().is_some()
	}

	pub fn len(&self) -> usize {
		self.current().map_or(0, |s| s.chunks.len())
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn current(&self) -> Option<Arc<Snapshot>> {
		self.snapshot.read().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Top-`k` chunks among those passing `filter`, highest BM25 first.
	pub fn search(&self, query: &str, filter: &MetadataFilter, k: usize) -> Result<Vec<ScoredChunk>> {
		let snapshot = self.current().ok_or(Error::NotReady)?;
		if k == 0 || snapshot.chunks.is_empty() {
			return Ok(Vec::new());
		}
		let mut analyzer = self.analyzer.clone();
		let terms = tokenize(&mut analyzer, query);
		let (k1, b) = (self.params.k1, self.params.b);
		let avg_len = if snapshot.avg_len > 0.0 { snapshot.avg_len } else { 1.0 };

		let mut scores: HashMap<usize, f32> = HashMap::new();
		for term in &terms {
			let Some(postings) = snapshot.postings.get(term) else { continue };
			let idf = snapshot.idf(postings.len());
			for &(pos, tf) in postings {
				if !filter.matches(&snapshot.chunks[pos].metadata) { continue; }
				let tf = tf as f32;
				let norm = k1 * (1.0 - b + b * snapshot.doc_len[pos] / avg_len);
				*scores.entry(pos).or_insert(0.0) += idf * tf * (k1 + 1.0) / (tf + norm);
			}
		}

		let mut hits: Vec<ScoredChunk> = scores
			.into_iter()
			.filter(|(_, s)| *s > 0.0)
			.map(|(pos, score)| ScoredChunk { chunk: snapshot.chunks[pos].clone(), score })
			.collect();
		sort_scored(&mut hits);
		hits.truncate(k);
		debug!(query_terms = terms.len(), hits = hits.len(), "BM25 search");
		Ok(hits)
	}
}
