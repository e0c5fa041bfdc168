//! Dialogue runtime and recommendation adapter.
//!
//! This crate drives a chat session from the first message to a quote:
//! - Routes each message by session mode (`runtime`)
//! - Classifies entry messages and suggestion replies (`conversation`)
//! - Asks a language model for a service recommendation (`llm`, `suggestion`)
//! - Repairs and decodes untrusted model output (`decoder`)
//! - Keeps recommended services inside the catalog (`guardrails`)
//!
//! # Safety Principle
//!
//! The model only proposes services and settings. Every price shown to the
//! user is computed by the pricing engine in `cloudquote-core`.

pub mod conversation;
pub mod decoder;
pub mod guardrails;
pub mod llm;
pub mod runtime;
pub mod suggestion;

pub use conversation::{EntryClassifier, EntryIntent, SuggestionReply};
pub use llm::{build_client, LlmClient, LlmError};
pub use runtime::{ChatResponse, DialogueRuntime};
pub use suggestion::SuggestionAdapter;
