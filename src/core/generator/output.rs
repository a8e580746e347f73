use crate::core::{GeneratorError, Result};

const FIM_SENTINELS: [&str; 4] = ["<fim_prefix>", "<fim_suffix>", "<fim_middle>", "<fim_pad>"];

/// Turns decoded backend output into the text returned to callers.
///
/// Strips a leading echo of `prompt`, removes fill-in-the-middle sentinels,
/// trims every line and drops blank ones.
pub fn clean_generated_text(prompt: &str, generated: &str) -> String {
    let mut text = strip_prompt(prompt, generated).to_string();

    for sentinel in FIM_SENTINELS {
        text = text.replace(sentinel, "");
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_prompt<'a>(prompt: &str, generated: &'a str) -> &'a str {
    if prompt.is_empty() {
        return generated;
    }
    if let Some(rest) = generated.strip_prefix(prompt) {
        return rest;
    }
    // Decoders often normalize leading/trailing whitespace of the prompt.
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return generated;
    }
    generated
        .trim_start()
        .strip_prefix(trimmed)
        .unwrap_or(generated)
}

/// Mean of the rows of `states`.
pub fn mean_pool(states: &[Vec<f32>]) -> Result<Vec<f32>> {
    let width = states
        .first()
        .map(Vec::len)
        .ok_or_else(|| GeneratorError::Backend(anyhow::anyhow!("no hidden states to pool")))?;

    let mut sum = vec![0.0f32; width];
    for row in states {
        if row.len() != width {
            return Err(GeneratorError::Backend(anyhow::anyhow!(
                "ragged hidden states: expected width {}, got {}",
                width,
                row.len()
            )));
        }
        for (acc, value) in sum.iter_mut().zip(row) {
            *acc += value;
        }
    }

    let count = states.len() as f32;
    Ok(sum.into_iter().map(|v| v / count).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_echoed_prompt() {
        let prompt = "def add(a, b):";
        let generated = "def add(a, b):\n    return a + b\n";
        assert_eq!(clean_generated_text(prompt, generated), "return a + b");
    }

    #[test]
    fn test_strips_prompt_after_leading_whitespace() {
        assert_eq!(clean_generated_text("x = ", " x = 1"), "1");
    }

    #[test]
    fn test_only_leading_prompt_is_stripped() {
        assert_eq!(clean_generated_text("ab", "cd ab"), "cd ab");
    }

    #[test]
    fn test_removes_fim_sentinels_and_blank_lines() {
        let generated = "<fim_prefix>first  \n\n   <fim_middle>second<fim_suffix>\n \n";
        assert_eq!(clean_generated_text("", generated), "first\nsecond");
    }

    #[test]
    fn test_mean_pool() {
        let states = vec![vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 5.0]];
        assert_eq!(mean_pool(&states).unwrap(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean_pool_rejects_empty_and_ragged() {
        assert!(mean_pool(&[]).is_err());
        assert!(mean_pool(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
