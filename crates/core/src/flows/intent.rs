use serde::{Deserialize, Serialize};

/// What a free-text reply asks the dialogue to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyIntent {
    Confirm,
    Modify,
    Restart,
    AddMore,
    Unknown,
}

pub trait ReplyClassifier: Send + Sync {
    fn classify(&self, text: &str) -> ReplyIntent;
}

/// Keyword heuristics over normalized tokens.
#[derive(Clone, Debug, Default)]
pub struct KeywordReplyClassifier;

impl ReplyClassifier for KeywordReplyClassifier {
    fn classify(&self, text: &str) -> ReplyIntent {
        classify_reply(text)
    }
}

const RESTART_COMMANDS: &[&str] =
    &["restart", "reset", "start over", "start again", "begin again", "new quote"];
const RESTART_FILLER: &[&str] = &["please", "let's", "lets", "just", "everything", "i", "want", "to"];
const ADD_MORE_PHRASES: &[&str] = &[
    "add more",
    "add another",
    "another service",
    "more services",
    "add a service",
    "add service",
    "one more",
];
const MODIFY_WORDS: &[&str] = &["modify", "change", "adjust", "edit", "update", "fix"];
const CONFIRM_WORDS: &[&str] = &[
    "yes", "y", "ok", "okay", "confirm", "confirmed", "sure", "accept", "accepted", "finalize",
    "finalise", "done", "yep", "yeah", "approve",
];
const CONFIRM_PHRASES: &[&str] = &["looks good", "sounds good", "go ahead", "that's right"];
const NEGATIONS: &[&str] = &["no", "not", "don't", "dont", "nope"];

pub fn classify_reply(text: &str) -> ReplyIntent {
    let normalized = normalize(text);
    let tokens = tokenize(&normalized);
    let has_word = |words: &[&str]| tokens.iter().any(|token| words.contains(&token.as_str()));
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|phrase| normalized.contains(phrase));

    if is_restart_request(&tokens) {
        return ReplyIntent::Restart;
    }
    if has_phrase(ADD_MORE_PHRASES) || tokens == ["add"] || tokens == ["more"] {
        return ReplyIntent::AddMore;
    }
    if has_word(MODIFY_WORDS) {
        return ReplyIntent::Modify;
    }
    if (has_word(CONFIRM_WORDS) || has_phrase(CONFIRM_PHRASES)) && !has_word(NEGATIONS) {
        return ReplyIntent::Confirm;
    }

    ReplyIntent::Unknown
}

/// True when the whole message is a bare restart command such as "restart" or "start over".
pub fn is_restart_command(text: &str) -> bool {
    let tokens = tokenize(&normalize(text));
    RESTART_COMMANDS.contains(&tokens.join(" ").as_str())
}

/// A restart command, optionally padded with politeness words ("let's start over please").
fn is_restart_request(tokens: &[String]) -> bool {
    let command = tokens
        .iter()
        .map(String::as_str)
        .filter(|token| !RESTART_FILLER.contains(token))
        .collect::<Vec<_>>()
        .join(" ");
    RESTART_COMMANDS.contains(&command.as_str())
}

pub(crate) fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub(crate) fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|character: char| !(character.is_alphanumeric() || character == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
