//! Model runtime backed by candle, reading checkpoints from the Hugging Face
//! hub or from a local directory laid out the same way.

mod models;
mod sampling;
mod tokenizer;

pub use models::CandleModel;
pub use sampling::GenerationOptions;
pub use tokenizer::HubTokenizer;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde_json::Value;

use crate::core::device::Device;
use crate::core::runtime::{CausalLm, ModelRuntime, TextTokenizer};

pub const DEFAULT_REVISION: &str = "main";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

#[derive(Debug, Clone)]
pub struct HubRuntime {
    token: Option<String>,
    revision: String,
}

impl HubRuntime {
    pub fn new() -> Self {
        Self {
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            revision: DEFAULT_REVISION.to_string(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    fn source(&self, checkpoint: &str) -> Result<CheckpointSource> {
        let local = Path::new(checkpoint);
        if local.is_dir() {
            return Ok(CheckpointSource::Local(local.to_path_buf()));
        }

        let api = ApiBuilder::new()
            .with_token(self.token.clone())
            .build()
            .context("failed to initialize hub client")?;
        let repo = api.repo(Repo::with_revision(
            checkpoint.to_string(),
            RepoType::Model,
            self.revision.clone(),
        ));
        Ok(CheckpointSource::Hub(repo))
    }
}

impl Default for HubRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRuntime for HubRuntime {
    fn load_tokenizer(&self, checkpoint: &str) -> Result<Box<dyn TextTokenizer>> {
        let source = self.source(checkpoint)?;
        let config = read_config(&source.file(CONFIG_FILE)?)?;
        let tokenizer = HubTokenizer::from_file(&source.file(TOKENIZER_FILE)?, &config)?;
        Ok(Box::new(tokenizer))
    }

    fn load_causal_lm(&self, checkpoint: &str, device: Device) -> Result<Box<dyn CausalLm>> {
        let source = self.source(checkpoint)?;
        let config = read_config(&source.file(CONFIG_FILE)?)?;
        let weights = source.weights()?;

        tracing::info!(checkpoint, %device, shards = weights.len(), "loading weights");
        let model = CandleModel::load(&config, &weights, device)
            .with_context(|| format!("failed to build model for {}", checkpoint))?;
        Ok(Box::new(model))
    }
}

enum CheckpointSource {
    Local(PathBuf),
    Hub(ApiRepo),
}

impl CheckpointSource {
    fn file(&self, name: &str) -> Result<PathBuf> {
        match self {
            CheckpointSource::Local(dir) => {
                let path = dir.join(name);
                if !path.is_file() {
                    bail!("{} not found in {}", name, dir.display());
                }
                Ok(path)
            }
            CheckpointSource::Hub(repo) => repo
                .get(name)
                .with_context(|| format!("failed to fetch {}", name)),
        }
    }

    /// Single-file weights, or every shard named in the index.
    fn weights(&self) -> Result<Vec<PathBuf>> {
        if let Ok(path) = self.file(WEIGHTS_FILE) {
            return Ok(vec![path]);
        }

        let index = read_config(&self.file(WEIGHTS_INDEX_FILE)?)?;
        let shards = shard_names(&index)?;
        shards.iter().map(|name| self.file(name)).collect()
    }
}

fn read_config(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn shard_names(index: &Value) -> Result<BTreeSet<String>> {
    let Some(weight_map) = index.get("weight_map").and_then(Value::as_object) else {
        bail!("safetensors index has no weight_map");
    };
    Ok(weight_map
        .values()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}
