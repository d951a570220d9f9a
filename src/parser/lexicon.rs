//! Data-driven lexicon for the requirement parser.
//!
//! All parsing heuristics live here as plain data: priority keywords
//! with weights, the domain tag vocabulary, requirement-marker verbs and
//! filler words. The tables are serde-enabled so a deployment can swap
//! in its own lexicon without touching parser control flow.

use crate::core::task::Priority;
use serde::{Deserialize, Serialize};

/// A keyword rule contributing weight toward a priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityRule {
    /// Literal word or phrase, matched case-insensitively on word
    /// boundaries.
    pub pattern: String,
    pub priority: Priority,
    pub weight: u32,
}

impl PriorityRule {
    fn new(pattern: &str, priority: Priority, weight: u32) -> Self {
        Self {
            pattern: pattern.to_string(),
            priority,
            weight,
        }
    }
}

/// The full rule set driving the requirement parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserLexicon {
    pub priority_rules: Vec<PriorityRule>,
    pub tag_vocabulary: Vec<String>,
    pub requirement_markers: Vec<String>,
    pub filler_words: Vec<String>,
}

impl Default for ParserLexicon {
    fn default() -> Self {
        let priority_rules = vec![
            PriorityRule::new("critical", Priority::Critical, 3),
            PriorityRule::new("urgent", Priority::Critical, 3),
            PriorityRule::new("outage", Priority::Critical, 3),
            PriorityRule::new("emergency", Priority::Critical, 3),
            PriorityRule::new("data loss", Priority::Critical, 3),
            PriorityRule::new("security", Priority::High, 2),
            PriorityRule::new("vulnerability", Priority::High, 2),
            PriorityRule::new("important", Priority::High, 2),
            PriorityRule::new("blocker", Priority::High, 2),
            PriorityRule::new("asap", Priority::High, 2),
            PriorityRule::new("production", Priority::High, 1),
            PriorityRule::new("nice to have", Priority::Low, 2),
            PriorityRule::new("someday", Priority::Low, 2),
            PriorityRule::new("minor", Priority::Low, 1),
            PriorityRule::new("cleanup", Priority::Low, 1),
            PriorityRule::new("trivial", Priority::Low, 1),
        ];

        let tag_vocabulary = [
            "security",
            "backend",
            "frontend",
            "database",
            "api",
            "authentication",
            "testing",
            "performance",
            "infrastructure",
            "deployment",
            "documentation",
            "ui",
            "monitoring",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let requirement_markers = [
            "implement",
            "use",
            "integrate",
            "support",
            "add",
            "build",
            "create",
            "migrate",
            "configure",
            "validate",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let filler_words = [
            "please",
            "kindly",
            "we need to",
            "we should",
            "we want to",
            "i want to",
            "i need to",
            "i would like to",
            "can you",
            "could you",
            "let's",
            "make sure to",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            priority_rules,
            tag_vocabulary,
            requirement_markers,
            filler_words,
        }
    }
}
