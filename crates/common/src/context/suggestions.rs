//! Suggestion request pipeline
//!
//! Builds the prompt, calls the generation service once and parses the
//! numbered reply into typed suggestions. [`SuggestionPipeline::suggest`]
//! never fails: a broken call becomes a single `error` suggestion and an
//! unparseable reply becomes a single `general` one.

use super::generation::{GenerationClient, GenerationParams};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

const MAX_SUGGESTIONS: usize = 3;
const FALLBACK_TEXT: &str = "Continue writing by expanding on your current ideas.";
const ERROR_TEXT: &str = "Unable to generate suggestions at the moment. Please try again.";

const PROMPT_INSTRUCTIONS: &str = "Please provide 3 helpful writing suggestions. \
Each suggestion should be one of these types:
1. CONTINUATION - How to continue writing the next sentence/paragraph
2. IMPROVEMENT - How to improve existing text
3. STRUCTURE - Suggestions about organization or flow

Format your response as:
1. [TYPE]: Suggestion text here
2. [TYPE]: Suggestion text here
3. [TYPE]: Suggestion text here

Keep suggestions concise and actionable.";

/// Category of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Continuation,
    Improvement,
    Structure,
    General,
    Error,
}

impl SuggestionKind {
    /// Tagged kinds and the label the model is asked to emit for each
    const TAGGED: [(&'static str, SuggestionKind); 3] = [
        ("[CONTINUATION]", SuggestionKind::Continuation),
        ("[IMPROVEMENT]", SuggestionKind::Improvement),
        ("[STRUCTURE]", SuggestionKind::Structure),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub text: String,
}

impl Suggestion {
    fn new(kind: SuggestionKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn fallback() -> Self {
        Self::new(SuggestionKind::General, FALLBACK_TEXT)
    }

    pub fn error() -> Self {
        Self::new(SuggestionKind::Error, ERROR_TEXT)
    }
}

/// Assemble the generation prompt.
///
/// `context` is capped at `context_cap` characters (plus an ellipsis) before
/// insertion; an empty context omits the reference section entirely.
pub fn build_prompt(title: &str, current_text: &str, context: &str, context_cap: usize) -> String {
    let mut prompt = format!(
        "You are a helpful writing assistant. Help the user continue their writing.\n\n\
         Title/Topic: \"{}\"\n\n",
        title
    );

    if !context.is_empty() {
        let capped = match context.char_indices().nth(context_cap) {
            Some((end, _)) => format!("{}...", &context[..end]),
            None => context.to_string(),
        };
        prompt.push_str("Reference Context (from uploaded documents):\n");
        prompt.push_str(&capped);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Current Text:\n");
    prompt.push_str(current_text);
    prompt.push_str("\n\n");
    prompt.push_str(PROMPT_INSTRUCTIONS);
    prompt
}

/// Parse a numbered reply; always returns between one and three suggestions
pub fn parse_suggestions(reply: &str) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = reply
        .lines()
        .map(str::trim)
        .filter(|line| ["1.", "2.", "3."].iter().any(|p| line.starts_with(p)))
        .map(parse_line)
        .take(MAX_SUGGESTIONS)
        .collect();

    if suggestions.is_empty() {
        suggestions.push(Suggestion::fallback());
    }
    suggestions
}

fn parse_line(line: &str) -> Suggestion {
    for (tag, kind) in SuggestionKind::TAGGED {
        if let Some(pos) = line.find(tag) {
            let text = line[pos + tag.len()..].trim_start_matches(':').trim();
            return Suggestion::new(kind, text);
        }
    }

    // untagged: everything after the ordinal's period
    let text = line.split_once('.').map_or(line, |(_, rest)| rest).trim();
    Suggestion::new(SuggestionKind::General, text)
}

/// Turns writing state into suggestions via one generation call
#[derive(Clone)]
pub struct SuggestionPipeline {
    client: Arc<dyn GenerationClient>,
    params: GenerationParams,
    prompt_context_chars: usize,
}

impl SuggestionPipeline {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        params: GenerationParams,
        prompt_context_chars: usize,
    ) -> Self {
        Self {
            client,
            params,
            prompt_context_chars,
        }
    }

    /// Request suggestions; failures are folded into the returned list
    pub async fn suggest(&self, title: &str, current_text: &str, context: &str) -> Vec<Suggestion> {
        let prompt = build_prompt(title, current_text, context, self.prompt_context_chars);
        let start = Instant::now();

        match self.client.generate(&prompt, &self.params).await {
            Ok(reply) => {
                let suggestions = parse_suggestions(&reply);
                let outcome = if suggestions == [Suggestion::fallback()] {
                    "fallback"
                } else {
                    "ok"
                };
                crate::metrics::record_suggestion(outcome, start.elapsed().as_secs_f64());
                tracing::debug!(
                    model = self.client.model_name(),
                    count = suggestions.len(),
                    outcome,
                    "Suggestions generated"
                );
                suggestions
            }
            Err(e) => {
                crate::metrics::record_suggestion("error", start.elapsed().as_secs_f64());
                tracing::error!(error = %e, model = self.client.model_name(), "Generation call failed");
                vec![Suggestion::error()]
            }
        }
    }
}
