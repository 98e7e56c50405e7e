use std::collections::BTreeSet;

use surveydb_core::chunker::{fingerprint_chunks, Chunker, ChunkingConfig};
use surveydb_core::error::Error;
use surveydb_core::traits::VectorIndex;
use surveydb_core::types::{Chunk, DocType, DocumentMetadata, MetadataFilter, SurveyType};
use surveydb_embed::HashingEmbedder;
use surveydb_vector::search::filter_to_sql;
use surveydb_vector::LanceVectorIndex;
use tempfile::TempDir;

const DIM: usize = 64;

fn meta(doc_id: &str, country: &str, phase: Option<u32>) -> DocumentMetadata {
    DocumentMetadata {
        doc_id: doc_id.to_string(),
        country: country.to_string(),
        phase,
        survey_type: Some(SurveyType::Baseline),
        doc_type: DocType::FullReport,
        year: Some(2013),
        title: format!("{country} baseline"),
        online_url: Some(format!("https://example.org/{doc_id}.pdf")),
    }
}

fn embedded_chunks(embedder: &HashingEmbedder, meta: &DocumentMetadata, text: &str) -> Vec<Chunk> {
    let chunker = Chunker::new(ChunkingConfig { chunk_size: 60, overlap: 10 }).expect("chunker");
    let mut chunks = chunker.chunk_document(meta, text);
    for c in &mut chunks { c.embedding = Some(embedder.embed_text(&c.text)); }
    chunks
}

async fn open(tmp: &TempDir) -> LanceVectorIndex {
    LanceVectorIndex::open(tmp.path(), "chunks", DIM).await.expect("open")
}

#[tokio::test]
async fn replace_document_swaps_whole_chunk_set() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let embedder = HashingEmbedder::new(DIM)?;
    let m = meta("kenya-baseline", "Kenya", Some(1));

    let long = embedded_chunks(&embedder, &m, &"Stunting among children under five in the ZOI. ".repeat(4));
    assert!(long.len() >= 3);
    index.replace_document("kenya-baseline", &long).await?;
    assert_eq!(index.count().await?, long.len());

    let short = embedded_chunks(&embedder, &m, "Household hunger in the ZOI.");
    assert_eq!(short.len(), 1);
    index.replace_document("kenya-baseline", &short).await?;

    let stored = index.all_chunks().await?;
    assert_eq!(stored.len(), 1, "no chunk of the previous set survives");
    assert_eq!(stored[0].text, short[0].text);
    assert_eq!(index.document_fingerprint("kenya-baseline").await?, Some(fingerprint_chunks(&short)));
    Ok(())
}

#[tokio::test]
async fn filter_applies_before_top_k() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let embedder = HashingEmbedder::new(DIM)?;
    let kenya = embedded_chunks(&embedder, &meta("kenya", "Kenya", Some(2)), "stunting prevalence children");
    let tanzania = embedded_chunks(&embedder, &meta("tanzania", "Tanzania", Some(2)), "women empowerment agriculture");
    index.replace_document("kenya", &kenya).await?;
    index.replace_document("tanzania", &tanzania).await?;

    let query = embedder.embed_text("stunting prevalence children");
    let unfiltered = index.search(&query, &MetadataFilter::default(), 1).await?;
    assert_eq!(unfiltered[0].chunk.metadata.country, "Kenya");

    let filter = MetadataFilter { countries: Some(BTreeSet::from(["Tanzania".to_string()])), ..Default::default() };
    let filtered = index.search(&query, &filter, 1).await?;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].chunk.metadata.country, "Tanzania");
    assert_eq!(filtered[0].chunk.metadata.online_url.as_deref(), Some("https://example.org/tanzania.pdf"));
    Ok(())
}

#[tokio::test]
async fn ties_beyond_fetch_window_break_by_chunk_id() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let embedder = HashingEmbedder::new(DIM)?;
    let boilerplate = "This report is made possible by the support of the American people.";
    for n in (0..30).rev() {
        let doc_id = format!("doc{n:02}");
        let chunks = embedded_chunks(&embedder, &meta(&doc_id, "Kenya", Some(1)), boilerplate);
        index.upsert(&chunks).await?;
    }

    let hits = index.search(&embedder.embed_text(boilerplate), &MetadataFilter::default(), 2).await?;
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["doc00:00000", "doc01:00000"]);
    Ok(())
}

#[tokio::test]
async fn rows_missing_an_attribute_fail_its_predicate() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let embedder = HashingEmbedder::new(DIM)?;
    let chunks = embedded_chunks(&embedder, &meta("no-phase", "Ghana", None), "anemia among women");
    index.replace_document("no-phase", &chunks).await?;

    let query = embedder.embed_text("anemia");
    let filter = MetadataFilter { phases: Some(BTreeSet::from([1])), ..Default::default() };
    assert!(index.search(&query, &filter, 5).await?.is_empty());
    assert_eq!(index.search(&query, &MetadataFilter::default(), 5).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn chunks_without_vectors_are_never_returned() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let embedder = HashingEmbedder::new(DIM)?;
    let mut chunks = embedded_chunks(&embedder, &meta("mali", "Mali", Some(1)), "dietary diversity of women");
    chunks[0].embedding = None;
    index.upsert(&chunks).await?;

    assert_eq!(index.count().await?, 1);
    assert_eq!(index.all_chunks().await?.len(), 1);
    let query = embedder.embed_text("dietary diversity of women");
    assert!(index.search(&query, &MetadataFilter::default(), 5).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_by_doc_id_removes_only_that_document() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let embedder = HashingEmbedder::new(DIM)?;
    let a = embedded_chunks(&embedder, &meta("a", "Kenya", Some(1)), "first document");
    let b = embedded_chunks(&embedder, &meta("b", "Uganda", Some(1)), "second document");
    index.upsert(&a).await?;
    index.upsert(&b).await?;
    index.delete_by_doc_id("a").await?;
    let left = index.all_chunks().await?;
    assert!(left.iter().all(|c| c.doc_id() == "b"));
    assert_eq!(index.document_fingerprint("a").await?, None);
    Ok(())
}

#[tokio::test]
async fn reopening_with_other_dimension_fails() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    drop(open(&tmp).await);
    let err = LanceVectorIndex::open(tmp.path(), "chunks", DIM * 2).await.err().expect("mismatch");
    assert!(matches!(err, Error::DimensionMismatch { provider: 128, stored: 64 }));
    Ok(())
}

#[tokio::test]
async fn wrong_width_vectors_are_rejected_on_write() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let index = open(&tmp).await;
    let mut chunks = embedded_chunks(&HashingEmbedder::new(DIM)?, &meta("x", "Haiti", None), "text");
    chunks[0].embedding = Some(vec![0.1; DIM + 1]);
    assert!(matches!(index.upsert(&chunks).await, Err(Error::DimensionMismatch { .. })));
    assert_eq!(index.count().await?, 0);
    Ok(())
}

#[test]
fn filter_renders_to_sql_predicate() {
    let filter = MetadataFilter {
        countries: Some(BTreeSet::from(["Cote d'Ivoire".to_string(), "Kenya".to_string()])),
        phases: Some(BTreeSet::from([1, 2])),
        survey_types: Some(BTreeSet::from([SurveyType::Baseline, SurveyType::BaselineMidline])),
        year_range: Some((2012, 2015)),
    };
    assert_eq!(
        filter_to_sql(&filter),
        "vector IS NOT NULL AND country IN ('Cote d''Ivoire', 'Kenya') AND phase IN (1, 2) \
         AND survey_type IN ('baseline', 'baseline_midline') AND (report_year >= 2012 AND report_year <= 2015)"
    );
    assert_eq!(filter_to_sql(&MetadataFilter::default()), "vector IS NOT NULL");
}
