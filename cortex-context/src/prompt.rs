//! Prompt assembly from ranked retrieval results.
//!
//! The prompt layout is consumed verbatim by the downstream orchestrator, so the
//! exact shape below must not drift:
//!
//! ```text
//! <instruction>- <context 1>
//! - <context 2>
//!
//! User question: <query>
//!
//! Answer:
//! ```
//!
//! Context texts are added in ranking order while their combined length (in
//! characters) stays within `max_context_chars`. The first text that would push
//! the total over the limit is left out, together with everything ranked below it.

use serde::{Deserialize, Serialize};

/// Instruction used when the caller does not supply one.
pub const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant. Use the context below to answer the question as best as possible.\n\nContext:\n";

/// Default budget for context text, in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 1500;

/// Builds prompts with a fixed instruction and context budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBuilder {
    /// Optional override for [`DEFAULT_INSTRUCTION`]
    pub instruction: Option<String>,
    /// Maximum total characters of context text
    pub max_context_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            instruction: None,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

impl PromptBuilder {
    pub fn new(max_context_chars: usize) -> Self {
        Self {
            instruction: None,
            max_context_chars,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Assembles a prompt for `query` from `contexts` in ranking order.
    pub fn build<I, T>(&self, query: &str, contexts: I) -> String
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        build_prompt(
            query,
            contexts,
            self.instruction.as_deref(),
            self.max_context_chars,
        )
    }
}

/// Assembles the prompt string; see the module docs for the exact layout.
///
/// ```
/// use cortex_context::prompt::build_prompt;
///
/// let prompt = build_prompt("Why?", ["because", "reasons"], Some("Ctx:\n"), 100);
/// assert_eq!(prompt, "Ctx:\n- because\n- reasons\n\nUser question: Why?\n\nAnswer:");
/// ```
pub fn build_prompt<I, T>(
    query: &str,
    contexts: I,
    instruction: Option<&str>,
    max_context_chars: usize,
) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let header = instruction.unwrap_or(DEFAULT_INSTRUCTION);

    let mut bullets = Vec::new();
    let mut total_chars = 0usize;
    for context in contexts {
        let snippet = context.as_ref();
        total_chars += snippet.chars().count();
        if total_chars > max_context_chars {
            break;
        }
        bullets.push(format!("- {snippet}"));
    }

    tracing::debug!(
        "Prompt uses {} context snippets within a {} character budget",
        bullets.len(),
        max_context_chars
    );

    format!(
        "{header}{}\n\nUser question: {query}\n\nAnswer:",
        bullets.join("\n")
    )
}
