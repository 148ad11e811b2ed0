use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Categories tried in order; within a category, patterns are tried in order.
/// Each pattern captures a trailing clause that ends in terminal punctuation.
const DEFAULT_RULES: &[(&str, &[&str])] = &[
    (
        "Technical Fact",
        &[
            // definitions
            r"(?:it|this|that|they|he|she)\s+(?:is|are|was|were|means|refers to)\s+(?:a|an|the)?\s*([^.!?]+(?:system|architecture|framework|technology|method|process)[^.!?]+[.!?])",
            // characteristics
            r"(?:the|a|an)\s+([^.!?]+(?:is|are|was|were)\s+(?:used for|designed to|implemented as|configured to)[^.!?]+[.!?])",
            // relationships
            r"(?:it|this|that|they|he|she)\s+(?:connects|integrates|interacts|communicates)\s+(?:with|to|through)\s+([^.!?]+[.!?])",
        ],
    ),
    (
        "Project Context",
        &[
            // structure
            r"(?:the|this|that)\s+(?:project|system|application)\s+(?:has|contains|includes|consists of)\s+([^.!?]+[.!?])",
            // requirements
            r"(?:we|they|he|she)\s+(?:need|require|must have)\s+([^.!?]+[.!?])",
            // constraints
            r"(?:the|this|that)\s+(?:project|system|application)\s+(?:must|should|needs to)\s+([^.!?]+[.!?])",
        ],
    ),
];

/// Clauses that are nothing but a pronoun and an auxiliary.
///
/// Captured clauses keep their closing mark, so every template accepts one
/// trailing `.`, `!` or `?`. A strict whole-clause match would let "It is a."
/// through as information.
const MEANINGLESS: &[&str] = &[
    r"(?i)^\s*(?:i|you|he|she|they|it|this|that|these|those)\s+(?:am|is|are|was|were)\s+(?:a|an|the)\s*[.!?]?\s*$",
    r"(?i)^\s*(?:i|you|he|she|they|it|this|that|these|those)\s+(?:am|is|are|was|were)\s*[.!?]?\s*$",
    r"(?i)^\s*(?:i|you|he|she|they|it|this|that|these|those)\s+(?:have|has|had)\s*[.!?]?\s*$",
    r"(?i)^\s*(?:i|you|he|she|they|it|this|that|these|those)\s+(?:want|need|like|love)\s*[.!?]?\s*$",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

static MEANINGLESS_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    MEANINGLESS
        .iter()
        .map(|p| Regex::new(p).expect("valid meaningless-clause pattern"))
        .collect()
});

static DEFAULT_EXTRACTOR: LazyLock<ContextExtractor> = LazyLock::new(ContextExtractor::default);

/// A clause pulled out of an exchange, tagged with its category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSummary {
    pub category: &'static str,
    pub clause: String,
}

impl fmt::Display for ContextSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.clause)
    }
}

/// One row of the extraction table.
#[derive(Clone)]
pub struct ExtractionRule {
    pub category: &'static str,
    pub pattern: Regex,
    pub validator: fn(&str) -> bool,
}

impl fmt::Debug for ExtractionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionRule")
            .field("category", &self.category)
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

impl ExtractionRule {
    /// Build a rule whose first capture group is the clause, validated by
    /// [`is_valid_context`].
    pub fn new(category: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            pattern: Regex::new(pattern)?,
            validator: is_valid_context,
        })
    }

    pub fn with_validator(mut self, validator: fn(&str) -> bool) -> Self {
        self.validator = validator;
        self
    }

    /// Leftmost valid clause for this rule, if any.
    fn first_valid(&self, haystack: &str) -> Option<ContextSummary> {
        self.pattern
            .captures_iter(haystack)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|clause| (self.validator)(clause))
            .map(|clause| ContextSummary {
                category: self.category,
                clause: clause.to_string(),
            })
    }
}

/// Ordered table of extraction rules. The first valid match wins.
#[derive(Clone, Debug)]
pub struct ContextExtractor {
    rules: Vec<ExtractionRule>,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .flat_map(|&(category, patterns)| {
                patterns.iter().map(move |p| {
                    ExtractionRule::new(category, p).expect("valid built-in extraction pattern")
                })
            })
            .collect();
        Self { rules }
    }
}

impl ContextExtractor {
    pub fn new(rules: Vec<ExtractionRule>) -> Self {
        Self { rules }
    }

    /// Append a rule; it is tried after every existing one.
    pub fn with_rule(mut self, rule: ExtractionRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    pub fn extract(&self, user_text: &str, ai_text: &str) -> Option<ContextSummary> {
        let combined = format!("{user_text} {ai_text}").to_lowercase();
        self.rules.iter().find_map(|rule| rule.first_valid(&combined))
    }
}

/// Summarize an exchange with the built-in rule table.
pub fn extract_context(user_text: &str, ai_text: &str) -> Option<ContextSummary> {
    DEFAULT_EXTRACTOR.extract(user_text, ai_text)
}

/// Whether a captured clause carries enough information to keep.
pub fn is_valid_context(clause: &str) -> bool {
    if clause.split_whitespace().count() < 3 {
        return false;
    }

    if !clause.ends_with(['.', '!', '?']) {
        return false;
    }

    if MEANINGLESS_RE.iter().any(|re| re.is_match(clause)) {
        return false;
    }

    let lower = clause.to_lowercase();
    let significant: HashSet<&str> = lower
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .collect();

    significant.len() >= 2
}
