//! OpenAI-compatible request and response bodies.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::params::{parameters, Parameters};
use crate::template::ChatTurn;

fn default_completion_max_tokens() -> usize {
    100
}

fn default_chat_max_tokens() -> usize {
    512
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default = "default_completion_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

impl CompletionRequest {
    pub fn parameters(&self) -> Parameters {
        parameters([
            ("max_new_tokens", json!(self.max_tokens)),
            ("temperature", json!(self.temperature)),
            ("top_p", json!(self.top_p)),
        ])
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    /// An explicit `null` falls back to the default temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: usize,
}

impl ChatCompletionRequest {
    pub fn parameters(&self) -> Parameters {
        parameters([
            ("max_new_tokens", json!(self.max_tokens)),
            ("temperature", json!(self.temperature.unwrap_or_else(default_temperature))),
        ])
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Counts whitespace-separated words, not model tokens.
    pub fn from_text(prompt: &str, completion: &str) -> Self {
        let prompt_tokens = prompt.split_whitespace().count();
        let completion_tokens = completion.split_whitespace().count();
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    pub index: usize,
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

impl CompletionResponse {
    fn new(id: String, object: &str, model: String, text: String, usage: Usage) -> Self {
        Self {
            id,
            object: object.to_string(),
            created: Utc::now().timestamp(),
            model,
            choices: vec![CompletionChoice {
                text,
                index: 0,
                logprobs: None,
                finish_reason: Some("stop".to_string()),
            }],
            usage,
        }
    }

    pub fn text_completion(model: String, prompt: &str, text: String) -> Self {
        let usage = Usage::from_text(prompt, &text);
        Self::new(
            format!("cmpl-{}", uuid::Uuid::new_v4()),
            "text_completion",
            model,
            text,
            usage,
        )
    }

    /// Chat replies share the completion shape; `prompt` is the flattened
    /// conversation used for usage accounting.
    pub fn chat_completion(model: String, prompt: &str, text: String) -> Self {
        let usage = Usage::from_text(prompt, &text);
        Self::new(
            format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            "chat.completion",
            model,
            text,
            usage,
        )
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub model: String,
    pub input: String,
    pub embeddings: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelData>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelData {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

impl ModelList {
    pub fn new<I: IntoIterator<Item = String>>(names: I) -> Self {
        let created = Utc::now().timestamp();
        Self {
            object: "list".to_string(),
            data: names
                .into_iter()
                .map(|id| ModelData {
                    id,
                    object: "model".to_string(),
                    created,
                    owned_by: "mai".to_string(),
                })
                .collect(),
        }
    }
}

/// Body of the deprecated `/api/generate` endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateRequest {
    pub inputs: String,
    #[serde(default)]
    pub parameters: Parameters,
}

pub const GENERATE_DEPRECATION: &str =
    "This endpoint is deprecated and will be removed in a future release. Please migrate to /v1/completions.";

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub generated_text: String,
    pub status: u16,
    pub warning: String,
}

impl GenerateResponse {
    pub fn new(generated_text: String) -> Self {
        Self {
            generated_text,
            status: 200,
            warning: GENERATE_DEPRECATION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_counts_words() {
        let usage = Usage::from_text("a b c", "d e");
        assert_eq!(
            usage,
            Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5
            }
        );
    }

    #[test]
    fn test_completion_request_defaults() {
        let req: CompletionRequest =
            serde_json::from_value(json!({"model": "codellama", "prompt": "def"})).unwrap();
        assert_eq!(req.max_tokens, 100);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.top_p, 1.0);
        assert_eq!(req.parameters()["max_new_tokens"], json!(100));
    }

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "qwen",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(req.max_tokens, 512);
        assert_eq!(req.messages, vec![ChatTurn::user("hi")]);
        assert!(!req.parameters().contains_key("top_p"));
        assert_eq!(req.parameters()["temperature"], json!(0.7));
    }

    #[test]
    fn test_chat_request_null_temperature_uses_default() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "qwen",
            "messages": [],
            "temperature": null
        }))
        .unwrap();
        assert_eq!(req.temperature, None);
        assert_eq!(req.parameters()["temperature"], json!(0.7));

        let req: ChatCompletionRequest =
            serde_json::from_value(json!({"model": "qwen", "messages": [], "temperature": 0.1})).unwrap();
        assert_eq!(req.parameters()["temperature"], json!(0.1));
    }

    #[test]
    fn test_completion_response_shape() {
        let resp = CompletionResponse::text_completion("codellama".into(), "a b c", "d e".into());
        let value = serde_json::to_value(&resp).unwrap();

        assert!(resp.id.starts_with("cmpl-"));
        assert_eq!(value["object"], "text_completion");
        assert_eq!(value["choices"][0]["logprobs"], Value::Null);
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["usage"]["total_tokens"], 5);

        let chat = CompletionResponse::chat_completion("qwen".into(), "user: hi", "hello".into());
        assert!(chat.id.starts_with("chatcmpl-"));
        assert_eq!(chat.object, "chat.completion");
    }

    #[test]
    fn test_generate_request_parameters_default_empty() {
        let req: GenerateRequest = serde_json::from_value(json!({"inputs": "def f():"})).unwrap();
        assert!(req.parameters.is_empty());
        assert_eq!(GenerateResponse::new(String::new()).status, 200);
    }
}
