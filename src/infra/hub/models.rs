use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device as CandleDevice, Tensor};
use candle_nn::{linear_no_bias, Linear, VarBuilder};
use candle_transformers::models::{bigcode, llama, qwen2};
use candle_transformers::utils::apply_repeat_penalty;
use serde_json::Value;

use super::sampling::GenerationOptions;
use crate::core::device::Device;
use crate::core::params::Parameters;
use crate::core::runtime::{CausalLm, TokenId};

/// Tokens considered when applying the repetition penalty.
const REPEAT_LAST_N: usize = 64;

enum Architecture {
    Llama {
        model: llama::Llama,
        config: llama::Config,
    },
    Qwen2 {
        model: qwen2::Model,
        lm_head: Linear,
    },
    BigCode {
        model: bigcode::GPTBigCode,
    },
}

/// A causal LM loaded from safetensors, dispatched on `model_type`.
pub struct CandleModel {
    arch: Architecture,
    device: CandleDevice,
    dtype: DType,
    eos_token_id: Option<TokenId>,
}

impl CandleModel {
    pub fn load(config: &Value, weights: &[PathBuf], device: Device) -> Result<Self> {
        let candle_device = candle_device(device)?;
        let dtype = if device.is_accelerator() { DType::F16 } else { DType::F32 };
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights, dtype, &candle_device)? };

        let model_type = config
            .get("model_type")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let arch = match model_type {
            "llama" => {
                let llama_config: llama::LlamaConfig =
                    serde_json::from_value(llama_compatible(config)?).context("invalid llama config")?;
                let config = llama_config.into_config(false);
                let model = llama::Llama::load(vb, &config)?;
                Architecture::Llama { model, config }
            }
            "qwen2" => {
                let cfg: qwen2::Config =
                    serde_json::from_value(config.clone()).context("invalid qwen2 config")?;
                let model = qwen2::Model::new(&cfg, vb.clone())?;
                let lm_head = if vb.contains_tensor("lm_head.weight") {
                    linear_no_bias(cfg.hidden_size, cfg.vocab_size, vb.pp("lm_head"))?
                } else {
                    let embeddings = vb
                        .pp("model.embed_tokens")
                        .get((cfg.vocab_size, cfg.hidden_size), "weight")?;
                    Linear::new(embeddings, None)
                };
                Architecture::Qwen2 { model, lm_head }
            }
            "gpt_bigcode" => {
                let model = bigcode::GPTBigCode::load(vb, bigcode_config(config)?)?;
                Architecture::BigCode { model }
            }
            other => bail!("unsupported model_type '{}'", other),
        };

        let eos_token_id = match config.get("eos_token_id") {
            Some(Value::Array(ids)) => ids.first().and_then(Value::as_u64),
            Some(other) => other.as_u64(),
            None => None,
        }
        .and_then(|id| TokenId::try_from(id).ok());

        Ok(Self {
            arch,
            device: candle_device,
            dtype,
            eos_token_id,
        })
    }

    fn input(&self, tokens: &[TokenId]) -> Result<Tensor> {
        Ok(Tensor::new(tokens, &self.device)?.unsqueeze(0)?)
    }

    /// Logits for the last position of `tokens`, given `pos` tokens already
    /// in the cache.
    fn next_logits(&mut self, tokens: &[TokenId], pos: usize, cache: &mut Option<llama::Cache>) -> Result<Tensor> {
        let input = self.input(tokens)?;
        let logits = match &mut self.arch {
            Architecture::Llama { model, .. } => {
                let cache = cache.as_mut().context("llama cache not initialized")?;
                model.forward(&input, pos, cache)?
            }
            Architecture::Qwen2 { model, lm_head } => {
                let hidden = model.forward(&input, pos, None)?;
                let seq_len = hidden.dim(1)?;
                hidden.narrow(1, seq_len - 1, 1)?.apply(&*lm_head)?
            }
            Architecture::BigCode { model } => model.forward(&input, 0)?,
        };

        Ok(logits.flatten_all()?.to_dtype(DType::F32)?)
    }

    fn reset(&mut self) -> Result<Option<llama::Cache>> {
        match &mut self.arch {
            Architecture::Llama { config, .. } => {
                Ok(Some(llama::Cache::new(true, self.dtype, config, &self.device)?))
            }
            Architecture::Qwen2 { model, .. } => {
                model.clear_kv_cache();
                Ok(None)
            }
            Architecture::BigCode { .. } => Ok(None),
        }
    }

    fn is_incremental(&self) -> bool {
        !matches!(self.arch, Architecture::BigCode { .. })
    }
}

impl CausalLm for CandleModel {
    fn generate(&mut self, input: &[TokenId], params: &Parameters) -> Result<Vec<TokenId>> {
        if input.is_empty() {
            bail!("cannot generate from an empty prompt");
        }

        let opts = GenerationOptions::from_params(params, self.eos_token_id);
        let mut processor = opts.logits_processor();
        let mut cache = self.reset()?;
        let mut tokens = input.to_vec();
        let mut pos = 0;

        for _ in 0..opts.max_new_tokens {
            // Incremental architectures only see tokens not yet in their cache.
            let (context, offset) = if self.is_incremental() {
                (tokens[pos..].to_vec(), pos)
            } else {
                (tokens.clone(), 0)
            };
            let mut logits = self.next_logits(&context, offset, &mut cache)?;
            pos = tokens.len();

            if opts.repetition_penalty != 1.0 {
                let start = tokens.len().saturating_sub(REPEAT_LAST_N);
                logits = apply_repeat_penalty(&logits, opts.repetition_penalty, &tokens[start..])?;
            }

            let next = processor.sample(&logits)?;
            if opts.is_eos(next) {
                break;
            }
            tokens.push(next);
        }

        tracing::debug!(new_tokens = tokens.len() - input.len(), "generation finished");
        Ok(tokens)
    }

    fn hidden_states(&mut self, input: &[TokenId]) -> Result<Vec<Vec<f32>>> {
        self.reset()?;
        let tensor = self.input(input)?;
        match &mut self.arch {
            Architecture::Qwen2 { model, .. } => {
                let hidden = model.forward(&tensor, 0, None)?;
                let states = hidden.squeeze(0)?.to_dtype(DType::F32)?.to_vec2::<f32>()?;
                model.clear_kv_cache();
                Ok(states)
            }
            _ => bail!("this architecture does not expose hidden states"),
        }
    }
}

fn candle_device(device: Device) -> Result<CandleDevice> {
    let resolved = match device {
        Device::Cpu => CandleDevice::Cpu,
        Device::Cuda(ordinal) => CandleDevice::new_cuda(ordinal)?,
        Device::Metal => CandleDevice::new_metal(0)?,
    };
    Ok(resolved)
}

/// Rewrites `rope_scaling` into a form the llama loader accepts, which only
/// knows the llama3 scheme.
///
/// Linear scaling (deepseek-coder) becomes a llama3 config whose smoothing
/// band sits below every rotary wavelength: with both wavelength bounds at 1,
/// each frequency takes the `freq / factor` branch, i.e. positions divided
/// by `factor`.
fn llama_compatible(config: &Value) -> Result<Value> {
    let mut config = config.clone();
    let Some(fields) = config.as_object_mut() else {
        bail!("llama config is not an object");
    };

    let scaling = match fields.get("rope_scaling") {
        None | Some(Value::Null) => return Ok(config),
        Some(scaling) => scaling.clone(),
    };
    let kind = scaling
        .get("rope_type")
        .or_else(|| scaling.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    match kind {
        "llama3" => {}
        "linear" => {
            let factor = scaling
                .get("factor")
                .and_then(Value::as_f64)
                .context("linear rope_scaling without a factor")?;
            fields.insert(
                "rope_scaling".to_string(),
                serde_json::json!({
                    "rope_type": "llama3",
                    "factor": factor,
                    "low_freq_factor": 1.0,
                    "high_freq_factor": 1.0,
                    "original_max_position_embeddings": 1,
                }),
            );
        }
        other => bail!("unsupported rope_scaling type '{}'", other),
    }
    Ok(config)
}

fn bigcode_config(config: &Value) -> Result<bigcode::Config> {
    let field = |name: &str| -> Result<usize> {
        config
            .get(name)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .with_context(|| format!("gpt_bigcode config is missing {}", name))
    };

    Ok(bigcode::Config {
        vocab_size: field("vocab_size")?,
        max_position_embeddings: field("n_positions")?,
        num_hidden_layers: field("n_layer")?,
        hidden_size: field("n_embd")?,
        layer_norm_epsilon: config
            .get("layer_norm_epsilon")
            .and_then(Value::as_f64)
            .unwrap_or(1e-5),
        n_inner: config.get("n_inner").and_then(Value::as_u64).map(|n| n as usize),
        num_attention_heads: field("n_head")?,
        multi_query: config
            .get("multi_query")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        use_cache: false,
    })
}
