use std::collections::{HashMap, HashSet};

use surveydb_core::types::{sort_ranked, RankedResult, SourceKind};

pub const DEFAULT_RANK_CONSTANT: f32 = 60.0;

/// Reciprocal Rank Fusion.
///
/// An entry at 1-indexed rank `r` of any list adds `1 / (rank_constant + r)` to
/// its chunk's fused score; lists a chunk is absent from add nothing. A chunk
/// repeated within one list only counts at its best rank. Output is sorted by
/// fused score desc, ties by chunk id asc, and holds each chunk once.
pub fn reciprocal_rank_fusion(lists: &[&[RankedResult]], rank_constant: f32) -> Vec<RankedResult> {
    let mut fused: HashMap<&str, f32> = HashMap::new();
    for list in lists {
        let mut seen: HashSet<&str> = HashSet::with_capacity(list.len());
        for (i, item) in list.iter().enumerate() {
            if !seen.insert(item.chunk_id.as_str()) {
                continue;
            }
            *fused.entry(item.chunk_id.as_str()).or_insert(0.0) += 1.0 / (rank_constant + (i + 1) as f32);
        }
    }
    let mut out: Vec<RankedResult> = fused
        .into_iter()
        .map(|(id, score)| RankedResult { chunk_id: id.to_string(), score, source: SourceKind::Fused })
        .collect();
    sort_ranked(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str], source: SourceKind) -> Vec<RankedResult> {
        ids.iter().enumerate().map(|(i, id)| RankedResult { chunk_id: id.to_string(), score: 1.0 / (i + 1) as f32, source }).collect()
    }

    #[test]
    fn rank_one_in_both_beats_rank_one_in_one() {
        let sem = list(&["a:00000", "b:00000"], SourceKind::Semantic);
        let kw = list(&["a:00000", "c:00000"], SourceKind::Keyword);
        let fused = reciprocal_rank_fusion(&[sem.as_slice(), kw.as_slice()], DEFAULT_RANK_CONSTANT);
        assert_eq!(fused[0].chunk_id, "a:00000");
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-6);
        assert!(fused[0].score > fused[1].score);
    }

    #[test]
    fn ties_break_by_chunk_id() {
        let sem = list(&["z:00000"], SourceKind::Semantic);
        let kw = list(&["m:00000"], SourceKind::Keyword);
        let fused = reciprocal_rank_fusion(&[sem.as_slice(), kw.as_slice()], DEFAULT_RANK_CONSTANT);
        let ids: Vec<_> = fused.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, ["m:00000", "z:00000"]);
        assert!(fused.iter().all(|r| r.source == SourceKind::Fused));
    }

    #[test]
    fn empty_lists_fuse_to_nothing() {
        let empty: Vec<RankedResult> = Vec::new();
        assert!(reciprocal_rank_fusion(&[empty.as_slice(), empty.as_slice()], DEFAULT_RANK_CONSTANT).is_empty());
    }
}
