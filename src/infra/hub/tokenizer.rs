use std::path::Path;

use anyhow::Result;
use serde_json::Value;
use tokenizers::Tokenizer;

use crate::core::runtime::{TextTokenizer, TokenId};

pub struct HubTokenizer {
    inner: Tokenizer,
    pad_token_id: Option<TokenId>,
    eos_token_id: Option<TokenId>,
}

impl HubTokenizer {
    /// `config` is the checkpoint's `config.json`, consulted for special ids.
    pub fn from_file(path: &Path, config: &Value) -> Result<Self> {
        let inner = Tokenizer::from_file(path).map_err(anyhow::Error::msg)?;
        Ok(Self::new(inner, config))
    }

    pub fn new(inner: Tokenizer, config: &Value) -> Self {
        let pad_token_id = token_id(config.get("pad_token_id"))
            .or_else(|| inner.get_padding().map(|p| p.pad_id));
        let eos_token_id = token_id(config.get("eos_token_id"));
        Self {
            inner,
            pad_token_id,
            eos_token_id,
        }
    }
}

/// Accepts an integer or a list of integers (first wins).
fn token_id(value: Option<&Value>) -> Option<TokenId> {
    let id = match value? {
        Value::Array(ids) => ids.first().and_then(Value::as_u64),
        other => other.as_u64(),
    };
    id.and_then(|id| TokenId::try_from(id).ok())
}

impl TextTokenizer for HubTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let encoding = self.inner.encode(text, true).map_err(anyhow::Error::msg)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(tokens, skip_special_tokens)
            .map_err(anyhow::Error::msg)
    }

    fn pad_token_id(&self) -> Option<TokenId> {
        self.pad_token_id
    }

    fn eos_token_id(&self) -> Option<TokenId> {
        self.eos_token_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_id_forms() {
        assert_eq!(token_id(Some(&json!(2))), Some(2));
        assert_eq!(token_id(Some(&json!([151645, 151643]))), Some(151645));
        assert_eq!(token_id(Some(&json!([]))), None);
        assert_eq!(token_id(Some(&Value::Null)), None);
        assert_eq!(token_id(None), None);
    }
}
