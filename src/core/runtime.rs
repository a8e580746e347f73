//! What the core needs from a model runtime.
//!
//! Implementations report failures as `anyhow::Error`; the generator layer
//! maps them onto [`GeneratorError`](super::error::GeneratorError).

use super::device::Device;
use super::params::Parameters;

pub type TokenId = u32;

pub trait ModelRuntime: Send + Sync {
    fn load_tokenizer(&self, checkpoint: &str) -> anyhow::Result<Box<dyn TextTokenizer>>;

    fn load_causal_lm(&self, checkpoint: &str, device: Device) -> anyhow::Result<Box<dyn CausalLm>>;
}

pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<TokenId>>;

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> anyhow::Result<String>;

    fn pad_token_id(&self) -> Option<TokenId>;

    fn eos_token_id(&self) -> Option<TokenId>;
}

pub trait CausalLm: Send {
    /// Runs generation and returns the prompt tokens followed by the new ones.
    fn generate(&mut self, input: &[TokenId], params: &Parameters) -> anyhow::Result<Vec<TokenId>>;

    /// Final-layer hidden states, one row per input token.
    fn hidden_states(&mut self, input: &[TokenId]) -> anyhow::Result<Vec<Vec<f32>>>;
}
