use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-R ids used when the tokenizer does not name them.
const DEFAULT_PAD_ID: u32 = 1;
const DEFAULT_EOS_ID: u32 = 2;

pub fn pad_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer.token_to_id("<pad>").unwrap_or(DEFAULT_PAD_ID)
}

fn eos_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer.token_to_id("</s>").unwrap_or(DEFAULT_EOS_ID)
}

/// Encode a batch, truncate to `max_len` and right-pad to the longest row.
/// Returns `(input_ids, attention_mask)`, both `[B, T]`.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let pad = pad_id(tokenizer);
    let mut rows = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        if ids.len() > max_len { ids.truncate(max_len); mask.truncate(max_len); }
        rows.push((ids, mask));
    }
    let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);
    let mut flat_ids = Vec::with_capacity(rows.len() * width);
    let mut flat_mask = Vec::with_capacity(rows.len() * width);
    for (mut ids, mut mask) in rows {
        let fill = width - ids.len();
        ids.extend(std::iter::repeat(pad).take(fill));
        mask.extend(std::iter::repeat(0).take(fill));
        flat_ids.extend(ids);
        flat_mask.extend(mask);
    }
    let input_ids = Tensor::from_vec(flat_ids, (texts.len(), width), device)?;
    let attention_mask = Tensor::from_vec(flat_mask, (texts.len(), width), device)?;
    Ok((input_ids, attention_mask))
}

/// Encode a `(query, passage)` pair for a cross-encoder. Over-long pairs are cut
/// from the passage end, keeping the closing separator.
pub fn tokenize_pair(tokenizer: &Tokenizer, query: &str, passage: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer.encode((query, passage), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    if ids.len() > max_len && max_len > 0 {
        ids.truncate(max_len);
        mask.truncate(max_len);
        ids[max_len - 1] = eos_id(tokenizer);
    }
    let len = ids.len();
    let input_ids = Tensor::from_vec(ids, (1, len), device)?;
    let attention_mask = Tensor::from_vec(mask, (1, len), device)?;
    Ok((input_ids, attention_mask))
}
