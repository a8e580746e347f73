use crate::core::params::{parameters, Parameters};
use crate::template::{self, ChatTurn};
use serde_json::{json, Value};
use std::fmt;

/// The closed set of backend behaviours a generator can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Plain causal LM; the runtime echoes the prompt, which is stripped afterwards.
    Completion,
    /// Chat-tuned checkpoint prompted through ChatML; only new tokens are decoded.
    /// Its base transformer exposes final hidden states, so it also embeds.
    Instruct,
    /// Text-generation pipeline that honours `return_full_text`.
    Pipeline,
}

/// How much of the generated sequence gets decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSpan {
    Full,
    NewTokens,
}

impl BackendKind {
    pub fn unsupported_parameters(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Completion | BackendKind::Instruct => &["return_full_text"],
            BackendKind::Pipeline => &[],
        }
    }

    pub fn supports_embeddings(&self) -> bool {
        matches!(self, BackendKind::Instruct)
    }

    pub fn default_parameters(&self) -> Parameters {
        let mut defaults = parameters([
            ("max_new_tokens", json!(50)),
            ("temperature", json!(0.8)),
            ("top_p", json!(0.9)),
            ("do_sample", json!(true)),
        ]);
        if let BackendKind::Instruct = self {
            defaults.insert("max_new_tokens".into(), json!(512));
        }
        defaults
    }

    pub fn format_prompt(&self, prompt: &str) -> String {
        match self {
            BackendKind::Instruct => template::instruct(prompt),
            BackendKind::Completion | BackendKind::Pipeline => prompt.to_string(),
        }
    }

    /// Chat-style backends keep roles; the others get `role: content` lines.
    pub fn format_chat(&self, turns: &[ChatTurn]) -> String {
        match self {
            BackendKind::Instruct => template::chat_ml(turns),
            BackendKind::Completion | BackendKind::Pipeline => template::flatten(turns),
        }
    }

    pub fn output_span(&self, params: &Parameters) -> OutputSpan {
        match self {
            BackendKind::Completion => OutputSpan::Full,
            BackendKind::Instruct => OutputSpan::NewTokens,
            BackendKind::Pipeline => match params.get("return_full_text") {
                Some(Value::Bool(false)) => OutputSpan::NewTokens,
                _ => OutputSpan::Full,
            },
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Completion => "completion",
            BackendKind::Instruct => "instruct",
            BackendKind::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert_eq!(BackendKind::Completion.unsupported_parameters(), &["return_full_text"]);
        assert!(BackendKind::Pipeline.unsupported_parameters().is_empty());
        assert!(BackendKind::Instruct.supports_embeddings());
        assert!(!BackendKind::Completion.supports_embeddings());
        assert!(!BackendKind::Pipeline.supports_embeddings());
    }

    #[test]
    fn test_default_parameters() {
        let defaults = BackendKind::Completion.default_parameters();
        assert_eq!(defaults["max_new_tokens"], json!(50));
        assert_eq!(defaults["do_sample"], json!(true));
        assert_eq!(BackendKind::Instruct.default_parameters()["max_new_tokens"], json!(512));
    }

    #[test]
    fn test_pipeline_output_span_follows_flag() {
        let kind = BackendKind::Pipeline;
        assert_eq!(kind.output_span(&Parameters::new()), OutputSpan::Full);
        assert_eq!(
            kind.output_span(&parameters([("return_full_text", json!(false))])),
            OutputSpan::NewTokens
        );
        assert_eq!(
            BackendKind::Completion.output_span(&parameters([("return_full_text", json!(false))])),
            OutputSpan::Full
        );
    }

    #[test]
    fn test_prompt_formatting() {
        assert_eq!(BackendKind::Completion.format_prompt("def f():"), "def f():");
        assert!(BackendKind::Instruct
            .format_prompt("write a sort")
            .contains("<|im_start|>user\nwrite a sort<|im_end|>"));
    }
}
