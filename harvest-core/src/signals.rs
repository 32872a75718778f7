//! Keyword classification of free-text comments into market signals.

use crate::error::ConfigError;
use crate::types::SignalTag;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Assigns signal tags to comment text. Implementations must be pure.
pub trait SignalClassifier {
    /// Every matching category, or `{Unclassified}` when none match.
    fn classify(&self, text: &str) -> BTreeSet<SignalTag>;
}

/// Built-in phrase lists, checked case-insensitively on word boundaries.
pub const DEFAULT_RULES: &[(SignalTag, &[&str])] = &[
    (
        SignalTag::PainPoint,
        &[
            r"frustrat\w*",
            r"annoy\w*",
            r"hate",
            r"wish",
            r"problem",
            r"issue",
            r"bug(gy|s)?",
            r"broken",
            r"crash(es|ed|ing)?",
            r"doesn'?t work",
            r"does not work",
            r"can'?t",
            r"won'?t",
            r"fail(s|ed|ing)?",
            r"terrible",
            r"awful",
            r"worst",
            r"disappoint\w*",
            r"useless",
            r"waste",
            r"why (can'?t|won'?t|doesn'?t)",
            r"should (be|have)",
        ],
    ),
    (
        SignalTag::FeatureRequest,
        &[
            r"wish (it|they|there|you)",
            r"would love",
            r"would be nice",
            r"please add",
            r"should add",
            r"feature request",
            r"hoping for",
            r"waiting for",
            r"need",
            r"want",
            r"suggestion",
            r"idea",
            r"proposal",
            r"can you (add|make|include)",
            r"will (there|you) (be|add)",
        ],
    ),
    (
        SignalTag::CompetitorMention,
        &[
            r"switched (to|from)",
            r"alternative(s)? to",
            r"alternative",
            r"better than",
            r"worse than",
            r"compared to",
            r"vs\.?",
            r"versus",
            r"moved to",
            r"came from",
            r"i use",
            r"i prefer",
            r"or should i",
        ],
    ),
    (
        SignalTag::PurchaseIntent,
        &[
            r"how much",
            r"worth( it)?",
            r"pric(e|es|ing)",
            r"cost(s)?",
            r"afford\w*",
            r"expensive",
            r"where (can|do) (i|you) (buy|get|purchase)",
            r"thinking (of|about) (buying|getting)",
            r"should i (buy|get)",
            r"subscri(be|ption)",
        ],
    ),
];

/// Ordered phrase matcher; every category that matches applies.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(SignalTag, Regex)>,
}

impl KeywordClassifier {
    /// Builds a classifier from per-category phrase patterns.
    pub fn new<S: AsRef<str>>(rules: &[(SignalTag, &[S])]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (tag, phrases) in rules {
            if phrases.is_empty() {
                continue;
            }
            let alternation = phrases
                .iter()
                .map(|p| format!("(?:{})", p.as_ref()))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)\b(?:{alternation})(?:\b|$|\s)");
            let regex = Regex::new(&pattern).map_err(|e| ConfigError::InvalidValue {
                field: format!("signals.{}", tag.as_str()),
                value: e.to_string(),
            })?;
            compiled.push((*tag, regex));
        }
        Ok(Self { rules: compiled })
    }

    /// Shared instance of the built-in rule set.
    pub fn builtin() -> &'static KeywordClassifier {
        static BUILTIN: OnceLock<KeywordClassifier> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            KeywordClassifier::new(DEFAULT_RULES).expect("built-in signal patterns are valid")
        })
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

impl SignalClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> BTreeSet<SignalTag> {
        let mut tags: BTreeSet<SignalTag> = self
            .rules
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(tag, _)| *tag)
            .collect();

        if tags.is_empty() {
            tags.insert(SignalTag::Unclassified);
        }
        tags
    }
}
