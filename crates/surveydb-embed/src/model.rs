use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::Config as XLMRobertaConfig;
use tokenizers::Tokenizer;
use tracing::info;

/// Tokenizer, config and weights read from one model directory.
pub struct ModelFiles {
    pub tokenizer: Tokenizer,
    pub config: XLMRobertaConfig,
    pub weights: HashMap<String, Tensor>,
}

/// Loads `tokenizer.json`, `config.json` and `model.safetensors` (falling back
/// to `pytorch_model.bin`) from `model_dir`.
pub fn load_model_files(model_dir: &Path, device: &Device) -> Result<ModelFiles> {
    if !model_dir.exists() {
        return Err(anyhow!("model directory {} does not exist", model_dir.display()));
    }
    let started = Instant::now();
    let tokenizer_path = model_dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
    let config_path = model_dir.join("config.json");
    let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
    let weights_path = weights_file(model_dir)?;
    let weights: HashMap<String, Tensor> = if weights_path.extension().is_some_and(|e| e == "safetensors") {
        candle_core::safetensors::load(&weights_path, device)?
    } else {
        candle_core::pickle::read_all(&weights_path)?.into_iter().collect()
    };
    info!(dir = %model_dir.display(), tensors = weights.len(), elapsed_ms = started.elapsed().as_millis() as u64, "model files loaded");
    Ok(ModelFiles { tokenizer, config, weights })
}

fn weights_file(model_dir: &Path) -> Result<PathBuf> {
    ["model.safetensors", "pytorch_model.bin"]
        .iter()
        .map(|name| model_dir.join(name))
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

pub fn var_builder(weights: HashMap<String, Tensor>, device: &Device) -> VarBuilder<'static> {
    VarBuilder::from_tensors(weights, DType::F32, device)
}

/// All-zero `token_type_ids` matching `input_ids`.
pub fn token_types(input_ids: &Tensor) -> Result<Tensor> {
    Ok(Tensor::zeros(input_ids.dims(), DType::I64, input_ids.device())?)
}
