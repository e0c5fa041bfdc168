pub mod elicitation;
pub mod fields;
pub mod intent;
pub mod messages;
pub mod states;

pub use elicitation::FieldElicitation;
pub use intent::{classify_reply, KeywordReplyClassifier, ReplyClassifier, ReplyIntent};
pub use states::{ElicitationState, TurnReply};
