//! Repair and decode of model output that is supposed to be a single JSON object.
//!
//! Output that already parses is used as is. Otherwise reasoning tags and markdown
//! fences are dropped wherever they sit outside the object, then the first balanced
//! object is cut out of the surrounding prose and comments and trailing commas are
//! removed. Every step past the wrapper scan skips JSON string contents.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("model output contained no JSON object")]
    NoObject,
    #[error("model output is not valid JSON after repair: {0}")]
    Syntax(String),
    #[error("model output has an unexpected shape: {0}")]
    Shape(String),
}

pub fn decode_untrusted<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let value = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(value) if value.is_object() => value,
        _ => {
            let repaired = repair(raw)?;
            serde_json::from_str(&repaired).map_err(|error| DecodeError::Syntax(error.to_string()))?
        }
    };
    if !value.is_object() {
        return Err(DecodeError::NoObject);
    }
    serde_json::from_value(value).map_err(|error| DecodeError::Shape(error.to_string()))
}

pub fn repair(raw: &str) -> Result<String, DecodeError> {
    let unwrapped = strip_wrappers(raw);
    let object = extract_object(&unwrapped).ok_or(DecodeError::NoObject)?;
    let uncommented = strip_comments(object);
    Ok(strip_trailing_commas(&uncommented))
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const FENCE: &str = "```";

/// Drops `<think>` blocks and code-fence markers (with their language tag) found
/// outside any JSON object. Inside an object, string contents are left alone.
fn strip_wrappers(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut index = 0;

    while index < raw.len() {
        let rest = &raw[index..];

        if depth == 0 {
            if rest.starts_with(THINK_OPEN) {
                match rest.find(THINK_CLOSE) {
                    Some(end) => {
                        index += end + THINK_CLOSE.len();
                        continue;
                    }
                    // unterminated reasoning swallows everything after it
                    None => break,
                }
            }
            if let Some(after) = rest.strip_prefix(FENCE) {
                let tag = after.find(|c: char| c == '\n' || c == '{').unwrap_or(after.len());
                index += FENCE.len() + tag;
                continue;
            }
        }

        let Some(character) = rest.chars().next() else {
            break;
        };
        index += character.len_utf8();
        output.push(character);

        if in_string {
            match character {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match character {
            '"' if depth > 0 => in_string = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    output
}

/// First balanced `{...}` span. A truncated object runs to end of input.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, character) in raw[start..].char_indices() {
        if in_string {
            match character {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match character {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Some(&raw[start..])
}

fn strip_comments(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(character) = chars.next() {
        if in_string {
            output.push(character);
            match character {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (character, chars.peek()) {
            ('"', _) => {
                in_string = true;
                output.push(character);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => output.push(character),
        }
    }

    output
}

fn strip_trailing_commas(raw: &str) -> String {
    let characters = raw.chars().collect::<Vec<_>>();
    let mut output = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for (index, &character) in characters.iter().enumerate() {
        if in_string {
            output.push(character);
            match character {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        if character == '"' {
            in_string = true;
        }
        if character == ',' {
            let next = characters[index + 1..].iter().find(|next| !next.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        output.push(character);
    }

    output
}
