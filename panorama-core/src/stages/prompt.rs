//! Prompt construction helpers shared by the AI-backed stages.
//!
//! Fetched web text and model output are untrusted. Anything embedded in a
//! prompt goes through [`escape_for_prompt`] and sits inside XML delimiters
//! so instructions hidden in page content stay inert.

use crate::types::ResearchSummary;

/// Per-source excerpt budget when research text is embedded in a prompt.
const EXCERPT_CHARS: usize = 2_000;
/// Snippet budget per source.
const SNIPPET_CHARS: usize = 300;
/// Sources included in the evidence block.
const MAX_PROMPT_SOURCES: usize = 12;

/// Escape untrusted text for prompt embedding.
///
/// Truncates to `max_len` characters, neutralizes XML delimiters, and strips
/// control characters other than newline and tab.
pub(crate) fn escape_for_prompt(input: &str, max_len: usize) -> String {
    let truncated: String = input.chars().take(max_len).collect();
    let mut result = String::with_capacity(truncated.len());
    for ch in truncated.chars() {
        match ch {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => result.push(c),
        }
    }
    result
}

/// Render the research evidence block for synthesis prompts.
pub(crate) fn evidence_block(research: &ResearchSummary) -> String {
    let mut evidence = String::new();
    for source in research.sources.iter().take(MAX_PROMPT_SOURCES) {
        evidence.push_str(&format!(
            "- {} ({})\n",
            escape_for_prompt(&source.title, 200),
            escape_for_prompt(&source.url, 300)
        ));
        let snippet = escape_for_prompt(&source.snippet, SNIPPET_CHARS);
        if !snippet.is_empty() {
            evidence.push_str(&snippet);
            evidence.push('\n');
        }
        let excerpt = escape_for_prompt(&source.raw_text, EXCERPT_CHARS);
        if !excerpt.is_empty() {
            evidence.push_str(&excerpt);
            evidence.push('\n');
        }
        evidence.push('\n');
    }
    evidence
}
