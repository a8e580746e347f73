use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are Qwen, created by Alibaba Cloud. You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Renders turns in ChatML and opens the assistant turn.
///
/// A default system turn is inserted when the conversation has none.
pub fn chat_ml(turns: &[ChatTurn]) -> String {
    let mut prompt = String::new();

    if turns.first().map(|t| t.role != "system").unwrap_or(true) {
        push_chat_ml_turn(&mut prompt, "system", DEFAULT_SYSTEM_PROMPT);
    }

    for turn in turns {
        push_chat_ml_turn(&mut prompt, &turn.role, &turn.content);
    }

    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

fn push_chat_ml_turn(prompt: &mut String, role: &str, content: &str) {
    prompt.push_str("<|im_start|>");
    prompt.push_str(role);
    prompt.push('\n');
    prompt.push_str(content);
    prompt.push_str("<|im_end|>\n");
}

/// Single-turn ChatML prompt for a raw user query.
pub fn instruct(query: &str) -> String {
    chat_ml(&[ChatTurn::system(DEFAULT_SYSTEM_PROMPT), ChatTurn::user(query)])
}

/// `role: content` lines for backends without a chat format.
pub fn flatten(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}
