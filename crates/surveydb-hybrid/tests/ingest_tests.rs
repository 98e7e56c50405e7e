mod common;

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use surveydb_core::traits::VectorIndex;
use surveydb_embed::HashingEmbedder;
use surveydb_hybrid::{load_catalog, IndexBuilder, IngestOutcome};

#[tokio::test]
async fn reingesting_unchanged_document_is_skipped() -> anyhow::Result<()> {
    let fx = Fixture::new().await?;
    let first = fx.builder.ingest_document(&kenya_doc(), &kenya_text()).await?;
    assert_eq!(first, IngestOutcome::Indexed { chunks: 3 });
    let again = fx.builder.ingest_document(&kenya_doc(), &kenya_text()).await?;
    assert_eq!(again, IngestOutcome::Unchanged);
    assert_eq!(fx.vector.count().await?, 3);
    Ok(())
}

#[tokio::test]
async fn changed_text_or_metadata_reindexes() -> anyhow::Result<()> {
    let fx = Fixture::new().await?;
    fx.builder.ingest_document(&kenya_doc(), &kenya_text()).await?;

    let shorter = fixed_len("Kenya endline: anemia among women of reproductive age. ", 150);
    assert_eq!(fx.builder.ingest_document(&kenya_doc(), &shorter).await?, IngestOutcome::Indexed { chunks: 2 });
    assert_eq!(fx.vector.count().await?, 2, "old chunk set fully replaced");

    let mut retitled = kenya_doc();
    retitled.title = "Kenya final evaluation".into();
    assert_eq!(fx.builder.ingest_document(&retitled, &shorter).await?, IngestOutcome::Indexed { chunks: 2 });
    assert!(fx.vector.all_chunks().await?.iter().all(|c| c.metadata.title == "Kenya final evaluation"));
    Ok(())
}

#[tokio::test]
async fn excluded_document_is_removed_and_never_chunked() -> anyhow::Result<()> {
    let fx = Fixture::new().await?;
    fx.builder.ingest_document(&kenya_doc(), &kenya_text()).await?;
    fx.builder.ingest_document(&tanzania_doc(), &tanzania_text()).await?;

    let mut excluded = kenya_doc();
    excluded.include = false;
    assert_eq!(fx.builder.ingest_document(&excluded, &kenya_text()).await?, IngestOutcome::Excluded);
    let left = fx.vector.all_chunks().await?;
    assert_eq!(left.len(), 3);
    assert!(left.iter().all(|c| c.doc_id() == "tanzania-baseline"));
    Ok(())
}

#[tokio::test]
async fn embedding_failure_leaves_previous_chunks_untouched() -> anyhow::Result<()> {
    let fx = Fixture::new().await?;
    fx.builder.ingest_document(&kenya_doc(), &kenya_text()).await?;
    let before = fx.vector.all_chunks().await?;

    let failing = IndexBuilder::new(chunker(), Arc::new(FailingEmbedder { retryable: false }), fx.vector.clone(), 2)?;
    let changed = fixed_len("Kenya endline: household hunger scale. ", 200);
    assert!(failing.ingest_document(&kenya_doc(), &changed).await.is_err());
    assert_eq!(fx.vector.all_chunks().await?, before);
    Ok(())
}

#[tokio::test]
async fn retryable_embedding_errors_are_retried() -> anyhow::Result<()> {
    let fx = Fixture::new().await?;
    let flaky = FlakyEmbedder { inner: HashingEmbedder::new(DIM)?, failures: AtomicU32::new(2) };
    let builder = IndexBuilder::new(chunker(), Arc::new(flaky), fx.vector.clone(), 10)?.with_retry(2, Duration::from_millis(1));
    assert_eq!(builder.ingest_document(&kenya_doc(), &kenya_text()).await?, IngestOutcome::Indexed { chunks: 3 });

    let flakier = FlakyEmbedder { inner: HashingEmbedder::new(DIM)?, failures: AtomicU32::new(5) };
    let builder = IndexBuilder::new(chunker(), Arc::new(flakier), fx.vector.clone(), 10)?.with_retry(1, Duration::from_millis(1));
    assert!(builder.ingest_document(&tanzania_doc(), &tanzania_text()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn catalog_ingest_reports_each_outcome() -> anyhow::Result<()> {
    let fx = Fixture::new().await?;
    let root = tempfile::TempDir::new()?;
    std::fs::write(root.path().join("kenya.md"), kenya_text())?;
    std::fs::write(root.path().join("tanzania.md"), tanzania_text())?;

    let mut missing = tanzania_doc();
    missing.doc_id = "mali-midline".into();
    missing.markdown_path = Some("mali.md".into());
    let mut excluded = kenya_doc();
    excluded.doc_id = "kenya-annex".into();
    excluded.include = false;

    let catalog = serde_json::json!({ "documents": [kenya_doc(), tanzania_doc(), missing, excluded] });
    let catalog_path = root.path().join("metadata.json");
    std::fs::write(&catalog_path, serde_json::to_string_pretty(&catalog)?)?;
    let docs = load_catalog(&catalog_path)?;
    assert_eq!(docs.len(), 4);

    let report = fx.builder.ingest_catalog(&docs, root.path()).await;
    assert_eq!((report.indexed, report.unchanged, report.excluded, report.failed), (2, 0, 1, 1));
    assert_eq!(report.chunks_written, 6);
    assert_eq!(report.failures[0].0, "mali-midline");

    let rerun = fx.builder.ingest_catalog(&docs, root.path()).await;
    assert_eq!((rerun.indexed, rerun.unchanged), (0, 2));
    assert_eq!(fx.refresh().await?, 6);
    Ok(())
}

#[test]
fn catalog_fields_default_when_absent() -> anyhow::Result<()> {
    let tmp = tempfile::TempDir::new()?;
    let path = tmp.path().join("metadata.json");
    std::fs::write(&path, r#"{"documents": [{"doc_id": "haiti-1", "country": "Haiti"}]}"#)?;
    let docs = load_catalog(&path)?;
    assert!(docs[0].include);
    assert_eq!(docs[0].phase, None);
    assert_eq!(docs[0].markdown_path, None);
    Ok(())
}
