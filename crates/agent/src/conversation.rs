use cloudquote_core::flows::intent::{classify_reply, ReplyIntent};
use serde::{Deserialize, Serialize};

/// How an opening message wants to proceed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryIntent {
    Manual,
    AiSuggestion,
    /// The message already describes a workload; it is sent for a suggestion directly.
    DetailedDescription,
    Unclear,
}

/// Decision on a pending suggestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionReply {
    Accept,
    Modify,
    SwitchToManual,
    Restart,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct EntryClassifier {
    /// Workload keywords needed before a message counts as a description.
    pub min_workload_signals: usize,
    pub min_words: usize,
}

impl Default for EntryClassifier {
    fn default() -> Self {
        Self { min_workload_signals: 2, min_words: 6 }
    }
}

impl EntryClassifier {
    pub fn classify(&self, text: &str) -> EntryIntent {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);

        if tokens == ["1"] || contains_any(&tokens, MANUAL_WORDS) || has_phrase(&normalized, MANUAL_PHRASES)
        {
            return EntryIntent::Manual;
        }
        if self.is_detailed(&tokens) {
            return EntryIntent::DetailedDescription;
        }
        if tokens == ["2"] || contains_any(&tokens, AI_WORDS) || has_phrase(&normalized, AI_PHRASES) {
            return EntryIntent::AiSuggestion;
        }

        EntryIntent::Unclear
    }

    pub fn workload_score(&self, text: &str) -> usize {
        let tokens = tokenize(&normalize_text(text));
        workload_signals(&tokens)
    }

    fn is_detailed(&self, tokens: &[String]) -> bool {
        tokens.len() >= self.min_words && workload_signals(tokens) >= self.min_workload_signals
    }
}

pub fn classify_suggestion_reply(text: &str) -> SuggestionReply {
    let normalized = normalize_text(text);
    let tokens = tokenize(&normalized);

    if contains_any(&tokens, MANUAL_WORDS) || has_phrase(&normalized, MANUAL_PHRASES) {
        return SuggestionReply::SwitchToManual;
    }

    match classify_reply(text) {
        ReplyIntent::Confirm => SuggestionReply::Accept,
        ReplyIntent::Modify => SuggestionReply::Modify,
        ReplyIntent::Restart => SuggestionReply::Restart,
        ReplyIntent::AddMore | ReplyIntent::Unknown => SuggestionReply::Unknown,
    }
}

const MANUAL_WORDS: &[&str] = &["manual", "manually", "myself"];
const MANUAL_PHRASES: &[&str] =
    &["option 1", "configure services", "choose services", "select services", "pick services"];
const AI_WORDS: &[&str] = &["ai", "suggest", "suggestion", "recommend", "recommendation", "advise"];
const AI_PHRASES: &[&str] = &["option 2", "help me choose", "not sure", "what do i need"];

const WORKLOAD_WORDS: &[&str] = &[
    "website", "site", "app", "application", "api", "backend", "platform", "shop", "store",
    "ecommerce", "blog", "users", "visitors", "customers", "traffic", "requests", "orders",
    "database", "storage", "images", "videos", "media", "files", "uploads", "daily", "monthly",
    "concurrent", "peak", "saas", "mobile",
];

fn workload_signals(tokens: &[String]) -> usize {
    let keywords = tokens.iter().filter(|token| WORKLOAD_WORDS.contains(&token.as_str())).count();
    let quantities = tokens.iter().any(|token| token.chars().any(|c| c.is_ascii_digit()));
    keywords + usize::from(quantities)
}

fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|character: char| !(character.is_alphanumeric() || character == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_any(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(&token.as_str()))
}

fn has_phrase(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}
