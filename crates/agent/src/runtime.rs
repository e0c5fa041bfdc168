use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cloudquote_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use cloudquote_core::cpq::CpqRuntime;
use cloudquote_core::domain::quote::{ConfiguredService, PricingBreakdown};
use cloudquote_core::domain::service::FieldKind;
use cloudquote_core::domain::session::{DialogueMode, DialogueSession, SessionId};
use cloudquote_core::domain::suggestion::{SuggestedService, Suggestion};
use cloudquote_core::errors::{ApplicationError, DialogueError};
use cloudquote_core::flows::elicitation::FieldElicitation;
use cloudquote_core::flows::intent::{
    is_restart_command, KeywordReplyClassifier, ReplyClassifier, ReplyIntent,
};
use cloudquote_core::flows::messages::{self, ENTRY_MENU, QUOTE_FOLLOW_UP};
use cloudquote_core::flows::states::TurnReply;
use cloudquote_core::store::SessionStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::conversation::{classify_suggestion_reply, EntryClassifier, EntryIntent, SuggestionReply};
use crate::suggestion::{render, SuggestionAdapter};

const DESCRIBE_PROMPT: &str = "Tell me about your application: what it does, how many users or \
requests you expect, and what data or files it stores. I'll recommend a setup and price it.";

const SUGGESTION_HELP: &str = "Reply 'accept' to use this recommendation, 'modify' to describe \
your needs again, or 'manual' to configure services yourself.";

const EMPTY_MESSAGE: &str = "I didn't catch anything there. Send a message to continue, or \
'restart' to go back to the main menu.";

/// What the chat surface returns for every inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub message: String,
    /// True when this turn delivered a full quote.
    pub complete: bool,
    pub mode: DialogueMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ConfiguredService>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
}

impl ChatResponse {
    fn message_only(session_id: &SessionId, mode: DialogueMode, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.clone(),
            message: message.into(),
            complete: false,
            mode,
            services: None,
            pricing: None,
            quote_id: None,
        }
    }
}

struct Turn {
    reply: TurnReply,
    suggestion: Option<Suggestion>,
    event_type: &'static str,
}

impl Turn {
    fn dialogue(reply: TurnReply, event_type: &'static str) -> Self {
        Self { reply, suggestion: None, event_type }
    }

    fn category(&self) -> AuditCategory {
        if self.reply.quote.is_some() {
            AuditCategory::Pricing
        } else if self.suggestion.is_some() {
            AuditCategory::Suggestion
        } else {
            AuditCategory::Dialogue
        }
    }
}

/// Routes each inbound message by session mode and persists the result.
///
/// Turns for one session are serialized through a per-session lock; different
/// sessions never contend. A turn works on a copy of the stored session and only
/// writes it back once the turn succeeded.
pub struct DialogueRuntime {
    cpq: CpqRuntime,
    store: Arc<dyn SessionStore>,
    suggestions: SuggestionAdapter,
    replies: Arc<dyn ReplyClassifier>,
    entry: EntryClassifier,
    audit: Arc<dyn AuditSink>,
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DialogueRuntime {
    pub fn new(
        cpq: CpqRuntime,
        store: Arc<dyn SessionStore>,
        suggestions: SuggestionAdapter,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            cpq,
            store,
            suggestions,
            replies: Arc::new(KeywordReplyClassifier),
            entry: EntryClassifier::default(),
            audit,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_reply_classifier(mut self, replies: Arc<dyn ReplyClassifier>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_entry_classifier(mut self, entry: EntryClassifier) -> Self {
        self.entry = entry;
        self
    }

    pub fn cpq(&self) -> &CpqRuntime {
        &self.cpq
    }

    pub async fn handle_message(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<ChatResponse, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.handle_message_with_correlation(session_id, text, &correlation_id).await
    }

    pub async fn handle_message_with_correlation(
        &self,
        session_id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<ChatResponse, ApplicationError> {
        let context = AuditContext::new(session_id.clone(), correlation_id, "dialogue-runtime");
        let lock = self.session_lock(session_id);
        let _turn = lock.lock().await;

        let stored = self.load(session_id, &context).await?;
        let mut session = stored.clone().unwrap_or_else(|| DialogueSession::new(session_id.clone()));

        if text.trim().is_empty() {
            return Ok(ChatResponse::message_only(session_id, session.mode, EMPTY_MESSAGE));
        }

        let mode_before = session.mode;
        match self.dispatch(&mut session, text.trim()).await {
            Ok(turn) => {
                session.record_turn();
                let current = session
                    .current_service
                    .as_deref()
                    .and_then(|name| self.cpq.catalog().get(name).ok());
                session.check_invariants(current)?;
                self.save(&session, &context).await?;

                info!(
                    event_name = "dialogue.turn.completed",
                    correlation_id,
                    session_id = %session_id,
                    from_mode = mode_before.as_str(),
                    to_mode = session.mode.as_str(),
                    event_type = turn.event_type,
                    "dialogue turn completed"
                );
                self.audit.emit(
                    context
                        .event(turn.event_type, turn.category(), AuditOutcome::Success)
                        .with_metadata("from_mode", mode_before.as_str())
                        .with_metadata("to_mode", session.mode.as_str()),
                );

                Ok(respond(&session, turn))
            }
            Err(error) => {
                info!(
                    event_name = "dialogue.turn.rejected",
                    correlation_id,
                    session_id = %session_id,
                    mode = mode_before.as_str(),
                    kind = error.kind(),
                    "dialogue turn rejected"
                );
                self.audit.emit(
                    context
                        .event("dialogue.turn_rejected", AuditCategory::Dialogue, AuditOutcome::Rejected)
                        .with_metadata("kind", error.kind())
                        .with_metadata("mode", mode_before.as_str()),
                );

                let state = stored.as_ref().map(|stored| stored.mode).unwrap_or_default();
                Ok(ChatResponse::message_only(session_id, state, error.user_message()))
            }
        }
    }

    /// Clears everything configured in the session and returns the main menu.
    pub async fn restart(&self, session_id: &SessionId) -> Result<ChatResponse, ApplicationError> {
        let context = AuditContext::new(session_id.clone(), format!("{session_id}-restart"), "dialogue-runtime");
        let lock = self.session_lock(session_id);
        let _turn = lock.lock().await;

        let mut session = self
            .load(session_id, &context)
            .await?
            .unwrap_or_else(|| DialogueSession::new(session_id.clone()));
        session.restart();
        session.record_turn();
        self.save(&session, &context).await?;

        self.audit.emit(context.event("dialogue.restarted", AuditCategory::Dialogue, AuditOutcome::Success));
        Ok(ChatResponse::message_only(session_id, session.mode, ENTRY_MENU))
    }

    pub async fn session(&self, session_id: &SessionId) -> Result<Option<DialogueSession>, ApplicationError> {
        Ok(self.store.get(session_id).await?)
    }

    /// Drops the stored session and its lock entry.
    pub async fn end_session(&self, session_id: &SessionId) -> Result<(), ApplicationError> {
        let context = AuditContext::new(session_id.clone(), format!("{session_id}-end"), "dialogue-runtime");
        {
            let lock = self.session_lock(session_id);
            let _turn = lock.lock().await;
            self.store.delete(session_id).await.map_err(|error| {
                self.persistence_failed(&context, "session.delete_failed", &error.to_string());
                error
            })?;
        }

        match self.locks.lock() {
            Ok(mut locks) => locks.remove(session_id),
            Err(poisoned) => poisoned.into_inner().remove(session_id),
        };
        self.audit.emit(context.event("dialogue.session_ended", AuditCategory::Dialogue, AuditOutcome::Success));
        Ok(())
    }

    async fn dispatch(&self, session: &mut DialogueSession, text: &str) -> Result<Turn, DialogueError> {
        let elicitation = FieldElicitation::new(&self.cpq, self.replies.as_ref());

        if self.wants_restart(session, text) {
            session.restart();
            return Ok(Turn::dialogue(
                TurnReply::message(format!("Starting over.\n\n{ENTRY_MENU}")),
                "dialogue.restarted",
            ));
        }

        match session.mode {
            DialogueMode::Idle => self.enter(session, text, &elicitation).await,
            DialogueMode::ManualServiceSelection => elicitation
                .select_service(session, text)
                .map(|reply| Turn::dialogue(reply, "dialogue.service_selected")),
            DialogueMode::ManualFieldCollection => elicitation
                .submit_field_value(session, text)
                .map(|reply| Turn::dialogue(reply, "dialogue.field_accepted")),
            DialogueMode::ManualConfirmation => elicitation
                .handle_confirmation(session, text)
                .map(|reply| Turn::dialogue(reply, "dialogue.confirmation_handled")),
            DialogueMode::AiSuggestionGathering => Ok(self.suggest(session, text).await),
            DialogueMode::AiSuggestionConfirmation => self.decide_suggestion(session, text, &elicitation),
        }
    }

    async fn enter(
        &self,
        session: &mut DialogueSession,
        text: &str,
        elicitation: &FieldElicitation<'_>,
    ) -> Result<Turn, DialogueError> {
        match self.entry.classify(text) {
            EntryIntent::Manual => {
                Ok(Turn::dialogue(elicitation.open_selection(session), "dialogue.manual_started"))
            }
            EntryIntent::AiSuggestion => {
                session.mode = DialogueMode::AiSuggestionGathering;
                Ok(Turn::dialogue(TurnReply::message(DESCRIBE_PROMPT), "dialogue.suggestion_started"))
            }
            EntryIntent::DetailedDescription => Ok(self.suggest(session, text).await),
            EntryIntent::Unclear => Ok(Turn::dialogue(TurnReply::message(ENTRY_MENU), "dialogue.menu_shown")),
        }
    }

    async fn suggest(&self, session: &mut DialogueSession, text: &str) -> Turn {
        let suggestion = self.suggestions.request_suggestion(text).await;
        if suggestion.is_fallback() {
            warn!(
                event_name = "dialogue.suggestion.fallback",
                session_id = %session.session_id,
                "serving fallback recommendation"
            );
        }

        session.pending_suggestion = Some(suggestion.clone());
        session.mode = DialogueMode::AiSuggestionConfirmation;
        Turn {
            reply: TurnReply::message(render(&suggestion)),
            suggestion: Some(suggestion),
            event_type: "suggestion.presented",
        }
    }

    fn decide_suggestion(
        &self,
        session: &mut DialogueSession,
        text: &str,
        elicitation: &FieldElicitation<'_>,
    ) -> Result<Turn, DialogueError> {
        match classify_suggestion_reply(text) {
            SuggestionReply::Accept => {
                let Some(suggestion) = session.pending_suggestion.take() else {
                    session.mode = DialogueMode::AiSuggestionGathering;
                    return Ok(Turn::dialogue(TurnReply::message(DESCRIBE_PROMPT), "suggestion.missing"));
                };
                session
                    .configured_services
                    .extend(suggestion.services.iter().map(SuggestedService::to_configured));
                session.current_service = None;
                session.reset_fields();
                session.mode = DialogueMode::ManualConfirmation;

                let quote = self.cpq.quote(&session.configured_services);
                let message = format!("{}\n\n{QUOTE_FOLLOW_UP}", messages::quote_summary(&quote));
                Ok(Turn::dialogue(TurnReply::with_quote(message, quote), "suggestion.accepted"))
            }
            SuggestionReply::Modify => {
                session.pending_suggestion = None;
                session.mode = DialogueMode::AiSuggestionGathering;
                Ok(Turn::dialogue(TurnReply::message(DESCRIBE_PROMPT), "suggestion.modify_requested"))
            }
            SuggestionReply::SwitchToManual => {
                session.pending_suggestion = None;
                Ok(Turn::dialogue(elicitation.open_selection(session), "suggestion.switched_to_manual"))
            }
            SuggestionReply::Restart | SuggestionReply::Unknown => {
                Err(DialogueError::State { mode: session.mode, help: SUGGESTION_HELP.to_string() })
            }
        }
    }

    fn wants_restart(&self, session: &DialogueSession, text: &str) -> bool {
        match session.mode {
            DialogueMode::Idle => false,
            // free text may mention resets; only a bare command counts here
            _ if self.expects_free_text(session) => is_restart_command(text),
            _ => self.replies.classify(text) == ReplyIntent::Restart,
        }
    }

    fn expects_free_text(&self, session: &DialogueSession) -> bool {
        match session.mode {
            DialogueMode::AiSuggestionGathering => true,
            DialogueMode::ManualFieldCollection => session
                .current_service
                .as_deref()
                .and_then(|name| self.cpq.catalog().get(name).ok())
                .and_then(|definition| definition.fields.get(session.current_field_index))
                .is_some_and(|field| matches!(field.kind, FieldKind::Text)),
            _ => false,
        }
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(session_id.clone()).or_default().clone()
    }

    async fn load(
        &self,
        session_id: &SessionId,
        context: &AuditContext,
    ) -> Result<Option<DialogueSession>, ApplicationError> {
        self.store.get(session_id).await.map_err(|error| {
            self.persistence_failed(context, "session.load_failed", &error.to_string());
            ApplicationError::from(error)
        })
    }

    async fn save(&self, session: &DialogueSession, context: &AuditContext) -> Result<(), ApplicationError> {
        self.store.set(session).await.map_err(|error| {
            self.persistence_failed(context, "session.save_failed", &error.to_string());
            ApplicationError::from(error)
        })
    }

    fn persistence_failed(&self, context: &AuditContext, event_type: &'static str, detail: &str) {
        warn!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            session_id = %context.session_id,
            error = detail,
            "session store failure"
        );
        self.audit.emit(
            context
                .event(event_type, AuditCategory::Persistence, AuditOutcome::Failed)
                .with_metadata("error", detail),
        );
    }
}

fn respond(session: &DialogueSession, turn: Turn) -> ChatResponse {
    let mut response = ChatResponse::message_only(&session.session_id, session.mode, turn.reply.message);

    if let Some(quote) = turn.reply.quote {
        response.complete = true;
        response.quote_id = Some(quote.id.0);
        response.services = Some(quote.services);
        response.pricing = Some(quote.pricing);
    } else if let Some(suggestion) = turn.suggestion {
        response.services =
            Some(suggestion.services.iter().map(SuggestedService::to_configured).collect());
        response.pricing = Some(suggestion.pricing);
    }

    response
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use cloudquote_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use cloudquote_core::cpq::CpqRuntime;
    use cloudquote_core::domain::session::{DialogueMode, DialogueSession, SessionId};
    use cloudquote_core::errors::ApplicationError;
    use cloudquote_core::flows::intent::{KeywordReplyClassifier, ReplyClassifier, ReplyIntent};
    use cloudquote_core::flows::messages::ENTRY_MENU;
    use cloudquote_core::store::{SessionStore, SessionStoreError};
    use cloudquote_db::repositories::InMemorySessionStore;
    use rust_decimal::Decimal;

    use super::DialogueRuntime;
    use crate::conversation::EntryClassifier;
    use crate::llm::{LlmClient, LlmError};
    use crate::suggestion::SuggestionAdapter;

    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            self.replies.lock().expect("reply lock").pop_front().unwrap_or(Err(LlmError::Empty))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _id: &SessionId) -> Result<Option<DialogueSession>, SessionStoreError> {
            Err(SessionStoreError::Backend("disk on fire".to_string()))
        }

        async fn set(&self, _session: &DialogueSession) -> Result<(), SessionStoreError> {
            Err(SessionStoreError::Backend("disk on fire".to_string()))
        }

        async fn delete(&self, _id: &SessionId) -> Result<(), SessionStoreError> {
            Err(SessionStoreError::Backend("disk on fire".to_string()))
        }
    }

    /// Stalls every read so concurrent turns overlap inside the runtime.
    struct SlowStore {
        inner: InMemorySessionStore,
        delay: Duration,
    }

    #[async_trait]
    impl SessionStore for SlowStore {
        async fn get(&self, id: &SessionId) -> Result<Option<DialogueSession>, SessionStoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(id).await
        }

        async fn set(&self, session: &DialogueSession) -> Result<(), SessionStoreError> {
            self.inner.set(session).await
        }

        async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError> {
            self.inner.delete(id).await
        }
    }

    /// Understands "da" as a confirmation and defers everything else.
    struct BilingualReplies;

    impl ReplyClassifier for BilingualReplies {
        fn classify(&self, text: &str) -> ReplyIntent {
            if text.trim().eq_ignore_ascii_case("da") {
                ReplyIntent::Confirm
            } else {
                KeywordReplyClassifier.classify(text)
            }
        }
    }

    struct Harness {
        runtime: Arc<DialogueRuntime>,
        store: Arc<InMemorySessionStore>,
        audit: InMemoryAuditSink,
    }

    fn harness(replies: Vec<Result<String, LlmError>>) -> Harness {
        let cpq = CpqRuntime::default();
        let client = Arc::new(ScriptedClient { replies: Mutex::new(replies.into()) });
        let suggestions = SuggestionAdapter::new(client, cpq.clone()).with_max_retries(0);
        let store = Arc::new(InMemorySessionStore::default());
        let audit = InMemoryAuditSink::default();
        let runtime =
            DialogueRuntime::new(cpq, store.clone(), suggestions, Arc::new(audit.clone()));
        Harness { runtime: Arc::new(runtime), store, audit }
    }

    fn id(value: &str) -> SessionId {
        SessionId(value.to_string())
    }

    async fn say(harness: &Harness, session: &SessionId, messages: &[&str]) -> super::ChatResponse {
        let mut last = None;
        for message in messages {
            last = Some(harness.runtime.handle_message(session, message).await.expect("turn"));
        }
        last.expect("at least one message")
    }

    const ECS_TURNS: &[&str] = &["ecs", "ecs.g6.large", "2", "100", "10"];
    const OSS_TURNS: &[&str] = &["oss", "500", "ZRS", "product photos"];

    #[tokio::test]
    async fn unclear_first_message_returns_two_option_menu() {
        let harness = harness(vec![]);
        let session = id("menu");

        let response = say(&harness, &session, &["hello there"]).await;

        assert_eq!(response.message, ENTRY_MENU);
        assert_eq!(response.mode, DialogueMode::Idle);
        assert!(harness.store.get(&session).await.expect("load").is_some());
    }

    #[tokio::test]
    async fn manual_flow_accumulates_services_into_one_quote() {
        let harness = harness(vec![]);
        let session = id("scenario-b");

        say(&harness, &session, &["1"]).await;
        say(&harness, &session, ECS_TURNS).await;
        say(&harness, &session, &["Add more services"]).await;
        say(&harness, &session, OSS_TURNS).await;
        let response = say(&harness, &session, &["Yes"]).await;

        assert!(response.complete);
        assert!(response.quote_id.as_deref().is_some_and(|id| id.starts_with("Q-")));
        let services = response.services.expect("services");
        assert_eq!(services.len(), 2);
        let pricing = response.pricing.expect("pricing");
        assert_eq!(pricing.subtotal, Decimal::from(1274));
        assert_eq!(pricing.total, pricing.subtotal * Decimal::new(115, 2));

        let stored = harness.store.get(&session).await.expect("load").expect("stored");
        assert_eq!(stored.configured_services.len(), 2);
        assert_eq!(stored.mode, DialogueMode::ManualConfirmation);
        assert!(!harness.audit.events_of(AuditCategory::Pricing).is_empty());
    }

    #[tokio::test]
    async fn validation_failure_leaves_stored_session_untouched() {
        let harness = harness(vec![]);
        let session = id("scenario-d");

        say(&harness, &session, &["1", "ecs", "ecs.g6.large"]).await;
        let before = harness.store.get(&session).await.expect("load");

        let response = say(&harness, &session, &["0"]).await;

        assert!(response.message.contains("from 1 to 100"));
        assert_eq!(response.mode, DialogueMode::ManualFieldCollection);
        assert_eq!(harness.store.get(&session).await.expect("load"), before);
        let rejected = harness
            .audit
            .events()
            .into_iter()
            .filter(|event| event.outcome == AuditOutcome::Rejected)
            .count();
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn restart_in_every_manual_state_clears_configured_services() {
        let prefixes: [&[&str]; 4] = [
            &["1", "ecs", "ecs.g6.large", "2", "100", "10", "add more"],
            &["1", "ecs", "ecs.g6.large"],
            &["1", "oss", "500", "ZRS"],
            &["1", "ecs", "ecs.g6.large", "2", "100", "10"],
        ];

        for (index, prefix) in prefixes.iter().enumerate() {
            let harness = harness(vec![]);
            let session = id(&format!("scenario-e-{index}"));
            say(&harness, &session, prefix).await;

            let response = say(&harness, &session, &["restart"]).await;

            assert!(response.message.contains(ENTRY_MENU));
            assert_eq!(response.mode, DialogueMode::Idle);
            let stored = harness.store.get(&session).await.expect("load").expect("stored");
            assert!(stored.configured_services.is_empty());
            assert!(stored.current_service.is_none());
        }
    }

    #[tokio::test]
    async fn non_json_completion_serves_fallback_suggestion() {
        let harness = harness(vec![Ok("Sorry, I can only chat in prose today.".to_string())]);
        let session = id("scenario-c");

        let response = say(
            &harness,
            &session,
            &["We run an online shop with 3000 daily visitors and lots of product images"],
        )
        .await;

        assert_eq!(response.mode, DialogueMode::AiSuggestionConfirmation);
        assert!(!response.complete);
        assert!(response.message.contains("'accept'"));
        let services = response.services.expect("suggested services");
        assert!(!services.is_empty());
        let stored = harness.store.get(&session).await.expect("load").expect("stored");
        assert!(stored.pending_suggestion.as_ref().is_some_and(|s| s.is_fallback()));
    }

    #[tokio::test]
    async fn accepted_suggestion_becomes_the_quote() {
        let harness = harness(vec![Ok(r#"{"analysis": "shop", "recommendedServices": [
            {"name": "ecs", "reason": "web", "config": {"instanceType": "ecs.g6.large", "count": 2, "diskSize": 100, "bandwidth": 10}},
            {"name": "oss", "reason": "images", "config": {"storage": 500, "redundancy": "ZRS"}}
        ], "estimatedCapacity": "5k visits/day", "monthlyCost": 42, "nextSteps": []}"#
            .to_string())]);
        let session = id("ai-accept");

        say(&harness, &session, &["2"]).await;
        let suggested = say(&harness, &session, &["an online shop with product images"]).await;
        assert_eq!(suggested.pricing.as_ref().map(|p| p.subtotal), Some(Decimal::from(1274)));

        let response = say(&harness, &session, &["accept"]).await;

        assert!(response.complete);
        assert_eq!(response.mode, DialogueMode::ManualConfirmation);
        assert_eq!(response.pricing.map(|p| p.total), Some(Decimal::new(146_510, 2)));
        let stored = harness.store.get(&session).await.expect("load").expect("stored");
        assert_eq!(stored.configured_services.len(), 2);
        assert!(stored.pending_suggestion.is_none());
    }

    #[tokio::test]
    async fn suggestion_can_be_exchanged_for_manual_configuration() {
        let harness = harness(vec![]);
        let session = id("ai-manual");

        say(&harness, &session, &["recommend something", "a blog with 100 daily readers"]).await;
        let response = say(&harness, &session, &["I'll configure it manually"]).await;

        assert_eq!(response.mode, DialogueMode::ManualServiceSelection);
        let stored = harness.store.get(&session).await.expect("load").expect("stored");
        assert!(stored.pending_suggestion.is_none());
        assert!(stored.configured_services.is_empty());
    }

    #[tokio::test]
    async fn unrecognised_suggestion_reply_is_a_state_error_not_a_mode_switch() {
        let harness = harness(vec![]);
        let session = id("ai-unknown");

        say(&harness, &session, &["2", "api backend with a database of orders"]).await;
        let response = say(&harness, &session, &["what about a cdn?"]).await;

        assert_eq!(response.mode, DialogueMode::AiSuggestionConfirmation);
        assert!(response.message.contains("'accept'"));
    }

    #[tokio::test]
    async fn blank_message_gets_reprompt_without_state_change() {
        let harness = harness(vec![]);
        let session = id("blank");
        say(&harness, &session, &["1"]).await;
        let before = harness.store.get(&session).await.expect("load");

        let response = say(&harness, &session, &["   "]).await;

        assert!(response.message.contains("didn't catch"));
        assert_eq!(harness.store.get(&session).await.expect("load"), before);
    }

    #[tokio::test]
    async fn text_field_value_mentioning_reset_is_stored_not_a_restart() {
        let harness = harness(vec![]);
        let session = id("bucket-purpose");
        say(&harness, &session, &["1"]).await;
        say(&harness, &session, ECS_TURNS).await;
        say(&harness, &session, &["add more", "oss", "500", "ZRS"]).await;

        let response = say(&harness, &session, &["nightly backups so we can reset the staging db"]).await;

        assert_eq!(response.mode, DialogueMode::ManualConfirmation);
        let stored = harness.store.get(&session).await.expect("load").expect("stored");
        assert_eq!(stored.configured_services.len(), 2);
        let oss =
            stored.configured_services.iter().find(|service| service.service_name == "oss").expect("oss");
        assert_eq!(
            oss.field_values.get("bucketPurpose").map(String::as_str),
            Some("nightly backups so we can reset the staging db")
        );
    }

    #[tokio::test]
    async fn workload_description_mentioning_reset_gets_a_suggestion() {
        let harness = harness(vec![]);
        let session = id("saas-description");
        say(&harness, &session, &["2"]).await;

        let response = say(
            &harness,
            &session,
            &["A SaaS app where 5000 users log in and reset passwords, storing files"],
        )
        .await;

        assert_eq!(response.mode, DialogueMode::AiSuggestionConfirmation);
        assert!(response.services.is_some_and(|services| !services.is_empty()));

        let other = id("saas-restart");
        let restarted = say(&harness, &other, &["2", "start over"]).await;
        assert_eq!(restarted.mode, DialogueMode::Idle);
        assert!(restarted.message.contains(ENTRY_MENU));
    }

    #[tokio::test]
    async fn concurrent_accepted_turns_for_one_session_are_all_counted() {
        let cpq = CpqRuntime::default();
        let client = Arc::new(ScriptedClient { replies: Mutex::new(VecDeque::new()) });
        let store = Arc::new(SlowStore {
            inner: InMemorySessionStore::default(),
            delay: Duration::from_millis(5),
        });
        let runtime = Arc::new(DialogueRuntime::new(
            cpq.clone(),
            store.clone(),
            SuggestionAdapter::new(client, cpq),
            Arc::new(InMemoryAuditSink::default()),
        ));
        let session = id("concurrent");
        for message in ["1"].iter().chain(ECS_TURNS) {
            runtime.handle_message(&session, message).await.expect("setup turn");
        }
        let before = store.get(&session).await.expect("load").expect("stored");
        assert_eq!(before.mode, DialogueMode::ManualConfirmation);

        const REPLIES: u32 = 8;
        let mut handles = Vec::new();
        for _ in 0..REPLIES {
            let runtime = runtime.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move { runtime.handle_message(&session, "yes").await }));
        }
        for handle in handles {
            let response = handle.await.expect("join").expect("turn");
            assert!(response.complete);
        }

        let stored = store.get(&session).await.expect("load").expect("stored");
        assert_eq!(stored.turn_count, before.turn_count + REPLIES);
        assert_eq!(stored.configured_services.len(), 1);
        assert_eq!(stored.mode, DialogueMode::ManualConfirmation);
    }

    #[tokio::test]
    async fn injected_reply_classifier_drives_confirmation() {
        let cpq = CpqRuntime::default();
        let client = Arc::new(ScriptedClient { replies: Mutex::new(VecDeque::new()) });
        let runtime = DialogueRuntime::new(
            cpq.clone(),
            Arc::new(InMemorySessionStore::default()),
            SuggestionAdapter::new(client, cpq),
            Arc::new(InMemoryAuditSink::default()),
        )
        .with_reply_classifier(Arc::new(BilingualReplies));
        let session = id("bilingual");
        for message in ["1"].iter().chain(ECS_TURNS) {
            runtime.handle_message(&session, message).await.expect("setup turn");
        }

        let response = runtime.handle_message(&session, "Da").await.expect("confirm");

        assert!(response.complete);
        assert_eq!(response.pricing.map(|p| p.subtotal), Some(Decimal::from(1199)));
    }

    #[tokio::test]
    async fn entry_classifier_thresholds_decide_when_a_message_is_a_description() {
        let cpq = CpqRuntime::default();
        let client = Arc::new(ScriptedClient { replies: Mutex::new(VecDeque::new()) });
        let runtime = DialogueRuntime::new(
            cpq.clone(),
            Arc::new(InMemorySessionStore::default()),
            SuggestionAdapter::new(client, cpq).with_max_retries(0),
            Arc::new(InMemoryAuditSink::default()),
        )
        .with_entry_classifier(EntryClassifier { min_workload_signals: 1, min_words: 2 });

        let response = runtime.handle_message(&id("terse"), "a blog").await.expect("turn");
        assert_eq!(response.mode, DialogueMode::AiSuggestionConfirmation);

        let harness = harness(vec![]);
        let default = say(&harness, &id("terse-default"), &["a blog"]).await;
        assert_eq!(default.mode, DialogueMode::Idle);
    }

    #[tokio::test]
    async fn explicit_restart_and_end_session() {
        let harness = harness(vec![]);
        let session = id("lifecycle");
        say(&harness, &session, &["1", "ecs"]).await;

        let restarted = harness.runtime.restart(&session).await.expect("restart");
        assert_eq!(restarted.message, ENTRY_MENU);

        harness.runtime.end_session(&session).await.expect("end");
        assert!(harness.runtime.session(&session).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_persistence_error() {
        let cpq = CpqRuntime::default();
        let client = Arc::new(ScriptedClient { replies: Mutex::new(VecDeque::new()) });
        let audit = InMemoryAuditSink::default();
        let runtime = DialogueRuntime::new(
            cpq.clone(),
            Arc::new(BrokenStore),
            SuggestionAdapter::new(client, cpq),
            Arc::new(audit.clone()),
        );

        let error = runtime.handle_message(&id("broken"), "1").await.expect_err("store is down");

        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert_eq!(audit.events_of(AuditCategory::Persistence).len(), 1);
    }
}
