//! Requirement parsing: free text in, structured task draft out.
//!
//! The parser is deterministic and entirely offline. Every heuristic is
//! driven by the [`ParserLexicon`] rule tables; matching is
//! case-insensitive on word boundaries. Parsing never fails: empty
//! input yields a placeholder draft flagged low-confidence.

pub mod lexicon;

pub use lexicon::{ParserLexicon, PriorityRule};

use crate::core::task::Priority;
use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Title used when the input carries no extractable clause.
pub const PLACEHOLDER_TITLE: &str = "Untitled task";

/// A structured task draft produced from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
    pub technical_requirements: Vec<String>,
}

/// Complexity analysis reported alongside a draft.
///
/// The score is bounded to 1..=10 and is never applied to the draft's
/// priority; callers decide what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub score: u8,
    pub input_length: usize,
    pub requirement_count: usize,
    pub tag_count: usize,
    /// Set when the input was empty and the draft is a placeholder.
    pub low_confidence: bool,
}

/// The full result of parsing one requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRequirement {
    pub draft: TaskDraft,
    pub complexity: ComplexityReport,
}

/// Deterministic free-text requirement parser.
pub struct RequirementParser {
    lexicon: ParserLexicon,
    title_cap: usize,
    priority_patterns: Vec<(Regex, Priority, u32)>,
    tag_patterns: Vec<(Regex, String)>,
    marker_patterns: Vec<Regex>,
}

impl RequirementParser {
    /// Compile a parser from a lexicon.
    ///
    /// # Errors
    /// Returns `ValidationFailed` if a lexicon pattern does not compile.
    pub fn new(lexicon: ParserLexicon, title_cap: usize) -> Result<Self> {
        let priority_patterns = lexicon
            .priority_rules
            .iter()
            .map(|rule| Ok((word_regex(&rule.pattern)?, rule.priority, rule.weight)))
            .collect::<Result<Vec<_>>>()?;
        let tag_patterns = lexicon
            .tag_vocabulary
            .iter()
            .map(|tag| Ok((word_regex(tag)?, tag.to_lowercase())))
            .collect::<Result<Vec<_>>>()?;
        let marker_patterns = lexicon
            .requirement_markers
            .iter()
            .map(|marker| word_regex(marker))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            lexicon,
            title_cap,
            priority_patterns,
            tag_patterns,
            marker_patterns,
        })
    }

    /// Parser with the built-in lexicon and the default title cap.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ParserLexicon::default(), crate::config::DEFAULT_TITLE_CAP)
    }

    /// The lexicon this parser was compiled from.
    pub fn lexicon(&self) -> &ParserLexicon {
        &self.lexicon
    }

    /// Parse free text (plus optional context) into a draft and a
    /// complexity report. Never fails.
    pub fn parse(&self, text: &str, context: Option<&str>) -> ParsedRequirement {
        let trimmed = text.trim();
        let combined = match context {
            Some(context) if !context.trim().is_empty() => {
                format!("{} {}", trimmed, context.trim())
            }
            _ => trimmed.to_string(),
        };
        let low_confidence = trimmed.is_empty();

        let title = self
            .extract_title(trimmed)
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string());
        let description = (!trimmed.is_empty()).then(|| trimmed.to_string());
        let priority = self.infer_priority(&combined);
        let tags = self.extract_tags(&combined);
        let technical_requirements = self.extract_requirements(&combined);

        let complexity = self.analyze_complexity(
            &combined,
            technical_requirements.len(),
            tags.len(),
            low_confidence,
        );

        ParsedRequirement {
            draft: TaskDraft {
                title,
                description,
                priority,
                tags,
                technical_requirements,
            },
            complexity,
        }
    }

    /// First sentence or clause, filler-stripped and capped on a word
    /// boundary.
    fn extract_title(&self, text: &str) -> Option<String> {
        let clause = text
            .split(['.', '!', '?', '\n', ';', ':'])
            .map(str::trim)
            .find(|clause| !clause.is_empty())?;

        let stripped = self.strip_fillers(clause);
        let title = if stripped.is_empty() { clause } else { &stripped };
        let title = collapse_whitespace(title);
        if title.is_empty() {
            return None;
        }
        Some(truncate_at_word(&title, self.title_cap))
    }

    /// Remove leading filler phrases, repeatedly.
    fn strip_fillers(&self, clause: &str) -> String {
        let mut rest = clause.trim();
        'outer: loop {
            let lower = rest.to_lowercase();
            for filler in &self.lexicon.filler_words {
                if lower == *filler {
                    rest = "";
                    break 'outer;
                }
                if lower.starts_with(filler) {
                    if let Some(tail) = rest.get(filler.len()..) {
                        if tail.starts_with([' ', ',']) {
                            rest = tail.trim_start_matches([' ', ',']);
                            continue 'outer;
                        }
                    }
                }
            }
            break;
        }
        rest.to_string()
    }

    /// Weighted keyword scoring; ties favor the more urgent priority,
    /// no signal defaults to medium.
    fn infer_priority(&self, text: &str) -> Priority {
        let mut scores: HashMap<Priority, u32> = HashMap::new();
        for (pattern, priority, weight) in &self.priority_patterns {
            if pattern.is_match(text) {
                *scores.entry(*priority).or_insert(0) += weight;
            }
        }
        scores
            .into_iter()
            .max_by_key(|&(priority, score)| (score, priority))
            .map(|(priority, _)| priority)
            .unwrap_or(Priority::Medium)
    }

    /// Every vocabulary term appearing in the input, as a set.
    fn extract_tags(&self, text: &str) -> BTreeSet<String> {
        self.tag_patterns
            .iter()
            .filter(|(pattern, _)| pattern.is_match(text))
            .map(|(_, tag)| tag.clone())
            .collect()
    }

    /// Clauses containing a requirement-marker verb, in input order.
    fn extract_requirements(&self, text: &str) -> Vec<String> {
        let mut requirements = Vec::new();
        for clause in text.split(['.', ';', '!', '?', '\n']) {
            let clause = collapse_whitespace(clause.trim());
            if clause.is_empty() {
                continue;
            }
            if self.marker_patterns.iter().any(|m| m.is_match(&clause))
                && !requirements.contains(&clause)
            {
                requirements.push(clause);
            }
        }
        requirements
    }

    /// Bounded 1..=10 score from input length, requirement count and
    /// distinct tag count.
    fn analyze_complexity(
        &self,
        text: &str,
        requirement_count: usize,
        tag_count: usize,
        low_confidence: bool,
    ) -> ComplexityReport {
        let input_length = text.chars().count();
        let length_points = (input_length / 100).min(4);
        let requirement_points = requirement_count.min(3);
        let tag_points = tag_count.min(2);
        let score = (1 + length_points + requirement_points + tag_points).clamp(1, 10) as u8;

        ComplexityReport {
            score,
            input_length,
            requirement_count,
            tag_count,
            low_confidence,
        }
    }
}

/// Compile a case-insensitive word-boundary matcher for a literal term.
fn word_regex(term: &str) -> Result<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term)))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::validation("lexicon", &format!("invalid pattern `{}`: {}", term, e)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate at the last word boundary within `cap` characters.
fn truncate_at_word(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let capped: String = text.chars().take(cap).collect();
    match capped.rfind(' ') {
        Some(index) if index > 0 => capped[..index].trim_end().to_string(),
        _ => capped,
    }
}
