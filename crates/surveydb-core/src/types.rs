//! Domain types shared by the keyword and vector engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

/// Survey round a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyType {
    Baseline,
    Interim,
    Midline,
    Endline,
    BaselineMidline,
}

impl SurveyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Interim => "interim",
            Self::Midline => "midline",
            Self::Endline => "endline",
            Self::BaselineMidline => "baseline_midline",
        }
    }
}

impl fmt::Display for SurveyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SurveyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Self::Baseline),
            "interim" => Ok(Self::Interim),
            "midline" => Ok(Self::Midline),
            "endline" => Ok(Self::Endline),
            "baseline_midline" => Ok(Self::BaselineMidline),
            other => Err(Error::Operation(format!("unknown survey type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    #[default]
    FullReport,
    KeyFindings,
    Reference,
    Planning,
}

impl DocType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullReport => "full_report",
            Self::KeyFindings => "key_findings",
            Self::Reference => "reference",
            Self::Planning => "planning",
        }
    }
}

impl FromStr for DocType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_report" => Ok(Self::FullReport),
            "key_findings" => Ok(Self::KeyFindings),
            "reference" => Ok(Self::Reference),
            "planning" => Ok(Self::Planning),
            other => Err(Error::Operation(format!("unknown doc type '{other}'"))),
        }
    }
}

fn default_include() -> bool {
    true
}

/// One source report as described by the ingestion catalog (`metadata.json`).
///
/// Documents with `include == false` are never chunked or indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub doc_id: String,
    pub country: String,
    #[serde(default)]
    pub phase: Option<u32>,
    #[serde(default)]
    pub survey_type: Option<SurveyType>,
    #[serde(default)]
    pub doc_type: DocType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_include")]
    pub include: bool,
    #[serde(default)]
    pub markdown_path: Option<String>,
    #[serde(default)]
    pub online_url: Option<String>,
}

impl Document {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            doc_id: self.doc_id.clone(),
            country: self.country.clone(),
            phase: self.phase,
            survey_type: self.survey_type,
            doc_type: self.doc_type,
            year: self.year,
            title: self.title.clone(),
            online_url: self.online_url.clone(),
        }
    }
}

/// Parent-document attributes copied onto every chunk so neither index
/// needs a join at query time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub doc_id: String,
    pub country: String,
    pub phase: Option<u32>,
    pub survey_type: Option<SurveyType>,
    pub doc_type: DocType,
    pub year: Option<i32>,
    pub title: String,
    pub online_url: Option<String>,
}

/// A contiguous slice of a document's normalized text.
///
/// - `chunk_id`: `"{doc_id}:{chunk_index:05}"`, so lexical order follows position
/// - `start_offset`/`char_length`: measured in characters, not bytes
/// - `embedding`: present only once the chunk has been embedded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub chunk_index: usize,
    pub text: String,
    pub start_offset: usize,
    pub char_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    pub fn doc_id(&self) -> &str {
        &self.metadata.doc_id
    }
}

/// Entities recognized in a query. Empty sets mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntities {
    pub countries: BTreeSet<String>,
    pub phases: BTreeSet<u32>,
    pub survey_types: BTreeSet<SurveyType>,
    pub year_range: Option<(i32, i32)>,
}

impl QueryEntities {
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
            && self.phases.is_empty()
            && self.survey_types.is_empty()
            && self.year_range.is_none()
    }

    /// Build the metadata filter both indexes apply before ranking.
    ///
    /// Combined baseline/midline reports answer either a baseline or a
    /// midline question, so requesting one admits `baseline_midline` too.
    pub fn to_filter(&self) -> MetadataFilter {
        let countries = (!self.countries.is_empty()).then(|| self.countries.clone());
        let phases = (!self.phases.is_empty()).then(|| self.phases.clone());
        let survey_types = (!self.survey_types.is_empty()).then(|| {
            let mut set = self.survey_types.clone();
            if set.contains(&SurveyType::Baseline) || set.contains(&SurveyType::Midline) {
                set.insert(SurveyType::BaselineMidline);
            }
            set
        });
        MetadataFilter { countries, phases, survey_types, year_range: self.year_range }
    }
}

/// Conjunction of per-attribute predicates; each present set is a disjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub countries: Option<BTreeSet<String>>,
    pub phases: Option<BTreeSet<u32>>,
    pub survey_types: Option<BTreeSet<SurveyType>>,
    pub year_range: Option<(i32, i32)>,
}

impl MetadataFilter {
    pub fn is_unrestricted(&self) -> bool {
        self.countries.is_none()
            && self.phases.is_none()
            && self.survey_types.is_none()
            && self.year_range.is_none()
    }

    /// A chunk missing an attribute never satisfies a predicate on it.
    pub fn matches(&self, meta: &DocumentMetadata) -> bool {
        if let Some(countries) = &self.countries {
            if !countries.contains(&meta.country) {
                return false;
            }
        }
        if let Some(phases) = &self.phases {
            if !meta.phase.is_some_and(|p| phases.contains(&p)) {
                return false;
            }
        }
        if let Some(types) = &self.survey_types {
            if !meta.survey_type.is_some_and(|t| types.contains(&t)) {
                return false;
            }
        }
        if let Some((lo, hi)) = self.year_range {
            if !meta.year.is_some_and(|y| y >= lo && y <= hi) {
                return false;
            }
        }
        true
    }
}

/// Which stage produced a ranking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Semantic,
    Keyword,
    Fused,
    Reranked,
}

/// Per-stage ranking entry. `score` is stage-specific but higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// A chunk returned by one of the indexes together with its engine score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl ScoredChunk {
    pub fn ranked(&self, source: SourceKind) -> RankedResult {
        RankedResult { chunk_id: self.chunk.chunk_id.clone(), score: self.score, source }
    }
}

/// What the retriever hands to the answering component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub text: String,
    pub score: f32,
    pub source: SourceKind,
    pub metadata: DocumentMetadata,
}

/// Input to a reranker: just enough to score a (query, passage) pair.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub chunk_id: ChunkId,
    pub text: String,
}

/// Sort descending by score, ties by chunk id ascending.
pub fn sort_ranked(results: &mut [RankedResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
}

/// Same ordering as [`sort_ranked`] for index output.
pub fn sort_scored(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| {
        b.score.total_cmp(&a.score).then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
}
