use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Error};
use candle_core::Device;
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Config, LlamaConfig, LlamaEosToks};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde_json::Value;
use tokenizers::Tokenizer;

use crate::config::ServerConfig;
use crate::llm::models::LlamaModel;

/// Tokens that end a turn in the model families this server is used with.
const EOS_CANDIDATES: [&str; 4] = ["<|EOT|>", "<|end_of_text|>", "<|eot_id|>", "</s>"];

pub struct LoadedModel {
    pub model: LlamaModel,
    pub tokenizer: Tokenizer,
    pub eos_token_ids: Vec<u32>,
    pub device: Device,
}

/// Fetches (or reuses from the local cache) everything needed to serve
/// `config.model_id` and builds the model on the configured device.
pub fn load(config: &ServerConfig) -> Result<LoadedModel, Error> {
    let api = ApiBuilder::new()
        .with_token(std::env::var("HF_TOKEN").ok())
        .build()?;
    let repo = api.repo(Repo::with_revision(
        config.model_id.clone(),
        RepoType::Model,
        config.revision.clone(),
    ));

    let config_path = repo.get("config.json")?;
    let tokenizer_path = repo.get("tokenizer.json")?;
    let weights_paths = weight_files(&repo)?;
    tracing::info!("Weights resolved: {:?}", weights_paths);

    let device = config.device.resolve()?;
    let dtype = config.dtype.resolve(&device);
    tracing::info!("Device: {:?}, dtype: {:?}", device, dtype);

    let cfg = load_model_config(&config_path)?;
    let tokenizer = load_tokenizer(&tokenizer_path)?;
    let eos_token_ids = eos_token_ids(&cfg, &tokenizer);
    if eos_token_ids.is_empty() {
        tracing::warn!("No end-of-sequence token found; generation always runs to max_tokens");
    }

    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights_paths, dtype, &device)? };
    let model = LlamaModel::new(vb, &cfg, dtype, &device)?;

    Ok(LoadedModel {
        model,
        tokenizer,
        eos_token_ids,
        device,
    })
}

fn weight_files(repo: &ApiRepo) -> Result<Vec<PathBuf>, Error> {
    match repo.get("model.safetensors") {
        Ok(path) => Ok(vec![path]),
        Err(single_err) => {
            let index_path = repo.get("model.safetensors.index.json").map_err(|index_err| {
                anyhow!(
                    "no safetensors weights found: {}; {}",
                    single_err,
                    index_err
                )
            })?;
            shard_names(&index_path)?
                .iter()
                .map(|name| repo.get(name).map_err(Error::from))
                .collect()
        }
    }
}

fn shard_names(index_path: &Path) -> Result<Vec<String>, Error> {
    let index: Value = serde_json::from_reader(File::open(index_path)?)?;
    let weight_map = index
        .get("weight_map")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("{:?} has no weight_map", index_path))?;

    let mut names: Vec<String> = weight_map
        .values()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

pub fn load_model_config(path: &Path) -> Result<Config, Error> {
    let raw: Value = serde_json::from_reader(File::open(path)?)
        .with_context(|| format!("reading {:?}", path))?;
    Ok(parse_model_config(raw)?.into_config(false))
}

/// Parses a Hugging Face `config.json`. Only llama3-style `rope_scaling`
/// is understood; any other kind is dropped.
pub fn parse_model_config(mut raw: Value) -> Result<LlamaConfig, Error> {
    if let Some(obj) = raw.as_object_mut() {
        let unsupported = obj
            .get("rope_scaling")
            .filter(|v| !v.is_null())
            .is_some_and(|v| v.get("rope_type").and_then(Value::as_str) != Some("llama3"));
        if unsupported {
            tracing::warn!(
                "Ignoring unsupported rope_scaling: {}",
                obj["rope_scaling"]
            );
            obj.remove("rope_scaling");
        }
    }

    Ok(serde_json::from_value(raw)?)
}

pub fn load_tokenizer(path: &Path) -> Result<Tokenizer, Error> {
    let tokenizer = Tokenizer::from_file(path).map_err(|e| anyhow!(e))?;
    Ok(tokenizer)
}

pub fn eos_token_ids(cfg: &Config, tokenizer: &Tokenizer) -> Vec<u32> {
    match &cfg.eos_token_id {
        Some(LlamaEosToks::Single(id)) => vec![*id],
        Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
        None => EOS_CANDIDATES
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect(),
    }
}
