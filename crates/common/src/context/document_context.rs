//! Document Context Builder - bounded context from uploaded documents
//!
//! Provides:
//! - Per-document allowance based on how many documents contribute
//! - Head/tail excerpts of oversized documents, cut at sentence boundaries
//! - A hard length backstop on the combined result
//!
//! All lengths are measured in characters, never bytes.

use crate::config::ContextConfig;
use crate::db::models::Document;

/// Joins the head and tail excerpts of an oversized document
pub const CONTINUES_MARKER: &str = "\n\n[...document continues...]\n\n";

const SECTION_SEPARATOR: &str = "\n\n";
const FILENAME_MAX_CHARS: usize = 60;
const ELLIPSIS: &str = "...";
/// Smallest allowance worth spending on a document: room for the marker plus real text
const MIN_EXCERPT_CHARS: usize = 250;

/// One document's contribution: where it came from and its extracted text
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    pub filename: &'a str,
    pub text: &'a str,
}

impl<'a> From<&'a Document> for SourceDocument<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            filename: &doc.original_filename,
            text: doc.content_text.as_deref().unwrap_or(""),
        }
    }
}

/// Budget knobs for splitting the context between documents
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Characters set aside per document for its header line
    pub header_reserve: usize,
    /// Upper bound on a single document's allowance when 3+ contribute
    pub per_document_cap: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for ContextLimits {
    fn from(config: &ContextConfig) -> Self {
        Self {
            header_reserve: config.header_reserve,
            per_document_cap: config.per_document_cap,
        }
    }
}

/// Builds the document context block inserted into suggestion prompts
#[derive(Debug, Clone, Default)]
pub struct DocumentContextBuilder {
    limits: ContextLimits,
}

impl DocumentContextBuilder {
    pub fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    /// Combine `docs` into at most `max_chars` characters.
    ///
    /// Documents with no text are skipped; no documents yields "".
    pub fn build(&self, docs: &[SourceDocument<'_>], max_chars: usize) -> String {
        let docs: Vec<&SourceDocument<'_>> =
            docs.iter().filter(|d| !d.text.trim().is_empty()).collect();
        if docs.is_empty() || max_chars == 0 {
            return String::new();
        }

        let kept = self.contributors(docs.len(), max_chars);
        if kept < docs.len() {
            tracing::debug!(
                documents = docs.len(),
                kept,
                max_chars,
                "Context budget too small for every document, keeping the first"
            );
        }
        let docs = &docs[..kept];
        let allowance = self.allowance(kept, max_chars);

        let sections: Vec<String> = docs
            .iter()
            .filter_map(|doc| {
                let body = excerpt(doc.text, allowance);
                if body.is_empty() {
                    return None;
                }
                Some(format!(
                    "--- From {} ---\n{}",
                    take_chars(doc.filename, FILENAME_MAX_CHARS),
                    body
                ))
            })
            .collect();

        let combined = sections.join(SECTION_SEPARATOR);
        enforce_max(combined, max_chars)
    }

    /// How many of `count` documents can each get a useful allowance; at least one
    fn contributors(&self, count: usize, max_chars: usize) -> usize {
        (1..=count)
            .rev()
            .find(|&k| self.allowance(k, max_chars) >= MIN_EXCERPT_CHARS)
            .unwrap_or(1)
    }

    /// Characters of body text each document may contribute
    fn allowance(&self, count: usize, max_chars: usize) -> usize {
        let reserve = self.limits.header_reserve;
        match count {
            0 => 0,
            1 => max_chars.saturating_sub(reserve),
            2 => max_chars.saturating_sub(2 * reserve) / 2,
            n => (max_chars.saturating_sub(n * reserve) / n).min(self.limits.per_document_cap),
        }
    }
}

/// Verbatim text when it fits, otherwise head + marker + tail
fn excerpt(text: &str, allowance: usize) -> String {
    let text = text.trim();
    let total = text.chars().count();
    if total <= allowance {
        return text.to_string();
    }

    let marker_len = CONTINUES_MARKER.chars().count();
    let half = allowance.saturating_sub(marker_len) / 2;
    if half == 0 {
        return take_chars(text, allowance).to_string();
    }

    let head = trim_head(take_chars(text, half));
    let tail = trim_tail(last_chars(text, half));
    format!("{}{}{}", head, CONTINUES_MARKER, tail)
}

/// Cut back to the last sentence end, unless that keeps under a fifth
fn trim_head(slice: &str) -> &str {
    match last_sentence_break(slice) {
        Some(end) if keeps_enough(&slice[..end], slice) => &slice[..end],
        _ => slice,
    }
}

/// Skip forward past the first sentence end, unless that keeps under a fifth
fn trim_tail(slice: &str) -> &str {
    match first_sentence_break(slice) {
        Some(start) => {
            let trimmed = slice[start..].trim_start();
            if keeps_enough(trimmed, slice) {
                trimmed
            } else {
                slice
            }
        }
        None => slice,
    }
}

fn keeps_enough(kept: &str, slice: &str) -> bool {
    let kept = kept.chars().count();
    kept > 0 && kept * 5 >= slice.chars().count()
}

/// Byte offsets just past each `.`, `!` or `?` that is followed by whitespace
fn sentence_breaks(s: &str) -> impl Iterator<Item = usize> + '_ {
    let mut chars = s.char_indices().peekable();
    std::iter::from_fn(move || {
        while let Some((_, c)) = chars.next() {
            if matches!(c, '.' | '!' | '?') {
                if let Some(&(next, n)) = chars.peek() {
                    if n.is_whitespace() {
                        return Some(next);
                    }
                }
            }
        }
        None
    })
}

fn last_sentence_break(s: &str) -> Option<usize> {
    sentence_breaks(s).last()
}

fn first_sentence_break(s: &str) -> Option<usize> {
    sentence_breaks(s).next()
}

fn take_chars(s: &str, n: usize) -> &str {
    s.char_indices().nth(n).map_or(s, |(i, _)| &s[..i])
}

fn last_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    s.char_indices().nth(count - n).map_or(s, |(i, _)| &s[i..])
}

/// Final backstop: never exceed `max_chars`
fn enforce_max(combined: String, max_chars: usize) -> String {
    if combined.chars().count() <= max_chars {
        return combined;
    }
    if max_chars < ELLIPSIS.len() {
        return take_chars(&combined, max_chars).to_string();
    }
    format!("{}{}", take_chars(&combined, max_chars - ELLIPSIS.len()), ELLIPSIS)
}
