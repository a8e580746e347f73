//! Generators wrap one pretrained checkpoint behind a uniform
//! load/generate/embed interface.

mod backend;
pub mod catalog;
pub mod output;
mod registry;

pub use backend::{BackendKind, OutputSpan};
pub use registry::GeneratorRegistry;

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde_json::json;

use super::device::Device;
use super::error::{GeneratorError, Result};
use super::params::{self, Parameters};
use super::runtime::{CausalLm, ModelRuntime, TextTokenizer};
use crate::template::ChatTurn;

struct LoadedBackend {
    tokenizer: Box<dyn TextTokenizer>,
    model: Mutex<Box<dyn CausalLm>>,
    defaults: Parameters,
}

pub struct Generator {
    kind: BackendKind,
    checkpoint: String,
    device: Device,
    defaults: Parameters,
    runtime: Arc<dyn ModelRuntime>,
    backend: OnceLock<LoadedBackend>,
}

impl Generator {
    pub fn new(
        kind: BackendKind,
        checkpoint: impl Into<String>,
        runtime: Arc<dyn ModelRuntime>,
    ) -> Self {
        Self {
            kind,
            checkpoint: checkpoint.into(),
            device: Device::default(),
            defaults: kind.default_parameters(),
            runtime,
            backend: OnceLock::new(),
        }
    }

    /// Overlays `overrides` on the kind's default parameters.
    pub fn with_defaults(mut self, overrides: Parameters) -> Self {
        for (key, value) in overrides {
            if !value.is_null() {
                self.defaults.insert(key, value);
            }
        }
        self
    }

    /// Replaces the default parameters wholesale, dropping the kind's own.
    pub fn with_default_set(mut self, defaults: Parameters) -> Self {
        self.defaults = defaults.into_iter().filter(|(_, v)| !v.is_null()).collect();
        self
    }

    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn checkpoint(&self) -> &str {
        &self.checkpoint
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn supports_embeddings(&self) -> bool {
        self.kind.supports_embeddings()
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.get().is_some()
    }

    /// Effective defaults: construction defaults before `load`, plus the
    /// tokenizer-derived `pad_token_id` afterwards.
    pub fn defaults(&self) -> &Parameters {
        self.backend
            .get()
            .map(|b| &b.defaults)
            .unwrap_or(&self.defaults)
    }

    /// Loads tokenizer and model through the runtime. Calling it again after
    /// success is a no-op.
    pub fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let tokenizer = self
            .runtime
            .load_tokenizer(&self.checkpoint)
            .map_err(|source| self.init_error(source))?;
        let model = self
            .runtime
            .load_causal_lm(&self.checkpoint, self.device)
            .map_err(|source| self.init_error(source))?;

        let mut defaults = self.defaults.clone();
        if let Some(pad) = tokenizer.pad_token_id().or_else(|| tokenizer.eos_token_id()) {
            defaults.insert("pad_token_id".to_string(), json!(pad));
        }

        tracing::info!(
            checkpoint = %self.checkpoint,
            kind = %self.kind,
            device = %self.device,
            defaults = ?defaults,
            "generator loaded"
        );

        // A concurrent load that won the race keeps its backend; ours is dropped.
        let _ = self.backend.set(LoadedBackend {
            tokenizer,
            model: Mutex::new(model),
            defaults,
        });
        Ok(())
    }

    pub fn generate(&self, prompt: &str, overrides: &Parameters) -> Result<String> {
        let formatted = self.kind.format_prompt(prompt);
        self.run_generation(prompt, &formatted, overrides)
    }

    pub fn generate_chat(&self, turns: &[ChatTurn], overrides: &Parameters) -> Result<String> {
        match self.kind {
            BackendKind::Instruct => {
                let formatted = self.kind.format_chat(turns);
                self.run_generation("", &formatted, overrides)
            }
            BackendKind::Completion | BackendKind::Pipeline => {
                self.generate(&self.kind.format_chat(turns), overrides)
            }
        }
    }

    /// Fails with `UnsupportedOperation` without touching the backend.
    pub fn ensure_embeddings(&self) -> Result<()> {
        if self.supports_embeddings() {
            return Ok(());
        }
        Err(GeneratorError::UnsupportedOperation {
            operation: "embeddings",
            checkpoint: self.checkpoint.clone(),
        })
    }

    pub fn generate_embeddings(&self, input: &str) -> Result<Vec<f32>> {
        self.ensure_embeddings()?;

        let backend = self.loaded()?;
        let tokens = backend.tokenizer.encode(input).map_err(GeneratorError::Backend)?;
        let states = backend
            .model
            .lock()
            .hidden_states(&tokens)
            .map_err(GeneratorError::Backend)?;

        output::mean_pool(&states)
    }

    /// `prompt` is what gets stripped from a full decode, `formatted` is what
    /// the model actually sees.
    fn run_generation(&self, prompt: &str, formatted: &str, overrides: &Parameters) -> Result<String> {
        let backend = self.loaded()?;
        let params = params::normalize(
            &backend.defaults,
            overrides,
            self.kind.unsupported_parameters().iter().copied(),
        );

        let input = backend.tokenizer.encode(formatted).map_err(GeneratorError::Backend)?;

        tracing::debug!(
            checkpoint = %self.checkpoint,
            prompt_tokens = input.len(),
            params = ?params,
            "generating"
        );

        let sequence = backend
            .model
            .lock()
            .generate(&input, &params)
            .map_err(GeneratorError::Backend)?;

        // Only a full decode carries the prompt echo.
        let (span, echoed) = match self.kind.output_span(&params) {
            OutputSpan::Full => (&sequence[..], prompt),
            OutputSpan::NewTokens => (sequence.get(input.len()..).unwrap_or(&[]), ""),
        };
        let text = backend
            .tokenizer
            .decode(span, true)
            .map_err(GeneratorError::Backend)?;

        Ok(output::clean_generated_text(echoed, &text))
    }

    fn loaded(&self) -> Result<&LoadedBackend> {
        self.backend
            .get()
            .ok_or_else(|| GeneratorError::NotLoaded(self.checkpoint.clone()))
    }

    fn init_error(&self, source: anyhow::Error) -> GeneratorError {
        GeneratorError::BackendInitialization {
            checkpoint: self.checkpoint.clone(),
            source,
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("kind", &self.kind)
            .field("checkpoint", &self.checkpoint)
            .field("device", &self.device)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRuntime;
    use super::*;
    use crate::core::params::parameters;

    fn generator(kind: BackendKind, runtime: Arc<ScriptedRuntime>) -> Generator {
        Generator::new(kind, "org/model", runtime)
    }

    #[test]
    fn test_generate_before_load_is_rejected() {
        let g = generator(BackendKind::Completion, Arc::new(ScriptedRuntime::default()));
        assert!(matches!(
            g.generate("def", &Parameters::new()),
            Err(GeneratorError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_load_failure_is_backend_initialization() {
        let runtime = Arc::new(ScriptedRuntime::default());
        runtime.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let g = generator(BackendKind::Completion, runtime);

        let err = g.load().unwrap_err();
        assert!(matches!(err, GeneratorError::BackendInitialization { ref checkpoint, .. } if checkpoint == "org/model"));
        assert!(!g.is_loaded());
    }

    #[test]
    fn test_backend_sees_normalized_parameters() {
        let runtime = Arc::new(ScriptedRuntime::default());
        let g = generator(BackendKind::Completion, runtime.clone())
            .with_default_set(parameters([("max_new_tokens", json!(50)), ("temperature", json!(0.8))]));
        g.load().unwrap();

        let overrides = parameters([("temperature", json!(0.2)), ("return_full_text", json!(true))]);
        g.generate("def", &overrides).unwrap();

        let seen = runtime.seen.lock()[0].clone();
        assert_eq!(
            seen,
            parameters([("max_new_tokens", json!(50)), ("temperature", json!(0.2))])
        );
    }

    #[test]
    fn test_with_defaults_overlays_kind_defaults() {
        let g = generator(BackendKind::Completion, Arc::new(ScriptedRuntime::default()))
            .with_defaults(parameters([("max_new_tokens", json!(100)), ("top_p", serde_json::Value::Null)]));

        assert_eq!(g.defaults()["max_new_tokens"], json!(100));
        assert_eq!(g.defaults()["top_p"], json!(0.9));
        assert_eq!(g.defaults()["do_sample"], json!(true));
    }

    #[test]
    fn test_pad_token_falls_back_to_eos() {
        let runtime = Arc::new(ScriptedRuntime {
            eos: Some(3),
            ..Default::default()
        });
        let g = generator(BackendKind::Completion, runtime);
        assert!(!g.defaults().contains_key("pad_token_id"));

        g.load().unwrap();
        assert_eq!(g.defaults()["pad_token_id"], json!(3));
    }

    #[test]
    fn test_completion_strips_prompt_and_sentinels() {
        let runtime = Arc::new(ScriptedRuntime {
            continuation: vec![4, 2, 3],
            ..Default::default()
        });
        let g = generator(BackendKind::Completion, runtime);
        g.load().unwrap();

        assert_eq!(g.generate("def f():", &Parameters::new()).unwrap(), "return 1");
    }

    #[test]
    fn test_instruct_decodes_new_tokens_only() {
        let runtime = Arc::new(ScriptedRuntime {
            continuation: vec![5],
            ..Default::default()
        });
        let g = generator(BackendKind::Instruct, runtime);
        g.load().unwrap();

        assert_eq!(g.generate("x", &Parameters::new()).unwrap(), "hello");
    }

    #[test]
    fn test_new_tokens_keep_an_opening_that_matches_the_prompt() {
        let runtime = Arc::new(ScriptedRuntime {
            continuation: vec![5, 2],
            ..Default::default()
        });
        let g = generator(BackendKind::Instruct, runtime.clone());
        g.load().unwrap();
        assert_eq!(g.generate("hello", &Parameters::new()).unwrap(), "hello return");

        let p = generator(BackendKind::Pipeline, runtime);
        p.load().unwrap();
        let partial = parameters([("return_full_text", json!(false))]);
        assert_eq!(p.generate("hello", &partial).unwrap(), "hello return");
    }

    #[test]
    fn test_pipeline_honours_return_full_text() {
        let runtime = Arc::new(ScriptedRuntime {
            continuation: vec![5],
            ..Default::default()
        });
        let g = generator(BackendKind::Pipeline, runtime.clone());
        g.load().unwrap();

        let partial = parameters([("return_full_text", json!(false))]);
        assert_eq!(g.generate("def", &partial).unwrap(), "hello");
        assert_eq!(runtime.seen.lock()[0]["return_full_text"], json!(false));
        assert_eq!(g.generate("def", &Parameters::new()).unwrap(), "hello");
    }

    #[test]
    fn test_embeddings_capability_checked_first() {
        let g = generator(BackendKind::Completion, Arc::new(ScriptedRuntime::default()));
        assert!(matches!(
            g.generate_embeddings("x"),
            Err(GeneratorError::UnsupportedOperation { operation: "embeddings", .. })
        ));

        let q = generator(BackendKind::Instruct, Arc::new(ScriptedRuntime::default()));
        assert!(matches!(q.generate_embeddings("x"), Err(GeneratorError::NotLoaded(_))));
        q.load().unwrap();
        // "def" -> 0, "hello" -> 5
        assert_eq!(q.generate_embeddings("def hello").unwrap(), vec![2.5, 1.0]);
    }
}
