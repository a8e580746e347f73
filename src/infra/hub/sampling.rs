use candle_transformers::generation::{LogitsProcessor, Sampling};

use crate::core::params::{as_usize, Parameters};
use crate::core::runtime::TokenId;

pub const DEFAULT_MAX_NEW_TOKENS: usize = 50;
pub const DEFAULT_SEED: u64 = 299792458;

/// Generation options read out of a normalized parameter map.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub repetition_penalty: f32,
    pub seed: u64,
    pub eos_token_id: Option<TokenId>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            do_sample: false,
            temperature: 1.0,
            top_p: None,
            top_k: None,
            repetition_penalty: 1.0,
            seed: DEFAULT_SEED,
            eos_token_id: None,
        }
    }
}

impl GenerationOptions {
    /// Unknown keys are ignored, as are values of the wrong type.
    pub fn from_params(params: &Parameters, eos_token_id: Option<TokenId>) -> Self {
        let mut opts = Self {
            eos_token_id,
            ..Self::default()
        };

        if let Some(n) = params.get("max_new_tokens").and_then(as_usize) {
            opts.max_new_tokens = n;
        }
        if let Some(b) = params.get("do_sample").and_then(|v| v.as_bool()) {
            opts.do_sample = b;
        }
        if let Some(t) = params.get("temperature").and_then(|v| v.as_f64()) {
            opts.temperature = t;
        }
        if let Some(p) = params.get("top_p").and_then(|v| v.as_f64()) {
            opts.top_p = Some(p);
        }
        if let Some(k) = params.get("top_k").and_then(as_usize) {
            opts.top_k = Some(k);
        }
        if let Some(r) = params.get("repetition_penalty").and_then(|v| v.as_f64()) {
            opts.repetition_penalty = r as f32;
        }
        if let Some(s) = params.get("seed").and_then(|v| v.as_u64()) {
            opts.seed = s;
        }
        if let Some(id) = params
            .get("eos_token_id")
            .and_then(|v| v.as_u64())
            .and_then(|id| TokenId::try_from(id).ok())
        {
            opts.eos_token_id = Some(id);
        }

        opts
    }

    pub fn sampling(&self) -> Sampling {
        if !self.do_sample || self.temperature <= 0.0 {
            return Sampling::ArgMax;
        }

        let temperature = self.temperature;
        // top_p >= 1.0 keeps the whole distribution.
        let top_p = self.top_p.filter(|p| *p > 0.0 && *p < 1.0);
        let top_k = self.top_k.filter(|k| *k > 0);

        match (top_k, top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }

    pub fn logits_processor(&self) -> LogitsProcessor {
        LogitsProcessor::from_sampling(self.seed, self.sampling())
    }

    pub fn is_eos(&self, token: TokenId) -> bool {
        self.eos_token_id == Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::parameters;
    use serde_json::json;

    #[test]
    fn test_from_params() {
        let params = parameters([
            ("max_new_tokens", json!(100)),
            ("temperature", json!(0.7)),
            ("top_p", json!(0.9)),
            ("do_sample", json!(true)),
            ("pad_token_id", json!(0)),
            ("repetition_penalty", json!(1.1)),
        ]);

        let opts = GenerationOptions::from_params(&params, Some(2));

        assert_eq!(opts.max_new_tokens, 100);
        assert!(opts.do_sample);
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.top_p, Some(0.9));
        assert_eq!(opts.top_k, None);
        assert!((opts.repetition_penalty - 1.1).abs() < 1e-6);
        assert!(opts.is_eos(2));
    }

    #[test]
    fn test_wrong_types_are_ignored() {
        let params = parameters([("max_new_tokens", json!("lots")), ("do_sample", json!(1))]);
        assert_eq!(
            GenerationOptions::from_params(&params, None),
            GenerationOptions::default()
        );
    }

    #[test]
    fn test_explicit_eos_overrides_tokenizer() {
        let params = parameters([("eos_token_id", json!(7))]);
        let opts = GenerationOptions::from_params(&params, Some(2));
        assert!(opts.is_eos(7));
        assert!(!opts.is_eos(2));
    }

    #[test]
    fn test_sampling_selection() {
        let greedy = GenerationOptions::default();
        assert!(matches!(greedy.sampling(), Sampling::ArgMax));

        let mut opts = GenerationOptions {
            do_sample: true,
            temperature: 0.8,
            ..Default::default()
        };
        assert!(matches!(opts.sampling(), Sampling::All { .. }));

        opts.top_p = Some(1.0);
        assert!(matches!(opts.sampling(), Sampling::All { .. }));

        opts.top_p = Some(0.9);
        assert!(matches!(opts.sampling(), Sampling::TopP { .. }));

        opts.top_k = Some(40);
        assert!(matches!(opts.sampling(), Sampling::TopKThenTopP { k: 40, .. }));

        opts.temperature = 0.0;
        assert!(matches!(opts.sampling(), Sampling::ArgMax));
    }
}
