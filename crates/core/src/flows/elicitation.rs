use crate::cpq::CpqRuntime;
use crate::domain::service::ServiceDefinition;
use crate::domain::session::{DialogueMode, DialogueSession};
use crate::errors::DialogueError;
use crate::flows::fields::validate_field_value;
use crate::flows::intent::{tokenize, ReplyClassifier, ReplyIntent};
use crate::flows::messages;
use crate::flows::states::TurnReply;

/// Drives one service at a time through selection, field input, and confirmation.
///
/// Every operation either mutates the session and returns a reply, or returns a
/// [`DialogueError`] and leaves the session untouched.
pub struct FieldElicitation<'a> {
    cpq: &'a CpqRuntime,
    replies: &'a dyn ReplyClassifier,
}

impl<'a> FieldElicitation<'a> {
    pub fn new(cpq: &'a CpqRuntime, replies: &'a dyn ReplyClassifier) -> Self {
        Self { cpq, replies }
    }

    pub fn open_selection(&self, session: &mut DialogueSession) -> TurnReply {
        session.mode = DialogueMode::ManualServiceSelection;
        session.current_service = None;
        session.reset_fields();
        TurnReply::message(messages::service_menu(self.cpq.catalog()))
    }

    pub fn select_service(
        &self,
        session: &mut DialogueSession,
        text: &str,
    ) -> Result<TurnReply, DialogueError> {
        let mentioned = self.mentioned_services(text);

        match mentioned.as_slice() {
            [] => Err(DialogueError::NotFound {
                requested: text.trim().to_string(),
                reprompt: format!(
                    "I couldn't match that to a service we offer.\n\n{}",
                    messages::service_menu(self.cpq.catalog())
                ),
            }),
            [definition] => {
                session.begin_service(definition.name.clone());
                if definition.fields.is_empty() {
                    return Ok(self.complete_service(session, definition));
                }
                Ok(TurnReply::message(format!(
                    "Let's configure {}.\n\n{}",
                    definition.display_name,
                    messages::field_prompt(definition, 0)
                )))
            }
            several => {
                let names = several
                    .iter()
                    .map(|definition| definition.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(TurnReply::message(format!(
                    "You mentioned {names}. I configure one service at a time, so which one should we start with? \
                     You can add the others afterwards."
                )))
            }
        }
    }

    pub fn submit_field_value(
        &self,
        session: &mut DialogueSession,
        text: &str,
    ) -> Result<TurnReply, DialogueError> {
        let Some(definition) = self.current_definition(session) else {
            return Ok(self.open_selection(session));
        };
        let index = session.current_field_index;
        let Some(field) = definition.fields.get(index) else {
            return Ok(self.complete_service(session, definition));
        };

        let value = validate_field_value(field, text).map_err(|rejection| {
            DialogueError::Validation {
                field: field.key.clone(),
                reprompt: messages::rejection(field, &rejection),
            }
        })?;

        session.collected_fields.insert(field.key.clone(), value);
        session.current_field_index = index + 1;

        if session.current_field_index >= definition.fields.len() {
            return Ok(self.complete_service(session, definition));
        }
        Ok(TurnReply::message(messages::field_prompt(definition, session.current_field_index)))
    }

    pub fn handle_confirmation(
        &self,
        session: &mut DialogueSession,
        text: &str,
    ) -> Result<TurnReply, DialogueError> {
        match self.replies.classify(text) {
            ReplyIntent::Confirm => {
                let quote = self.cpq.quote(&session.configured_services);
                session.current_service = None;
                session.reset_fields();
                let message =
                    format!("{}\n\n{}", messages::quote_summary(&quote), messages::QUOTE_FOLLOW_UP);
                Ok(TurnReply::with_quote(message, quote))
            }
            ReplyIntent::AddMore => {
                let reply = self.open_selection(session);
                Ok(TurnReply::message(format!(
                    "Sure. Your {} configured service(s) are kept.\n\n{}",
                    session.configured_services.len(),
                    reply.message
                )))
            }
            ReplyIntent::Modify => {
                let Some(definition) = self.current_definition(session) else {
                    return Err(DialogueError::State {
                        mode: session.mode,
                        help: format!(
                            "There is no service in progress to modify. {}",
                            messages::QUOTE_FOLLOW_UP
                        ),
                    });
                };

                // the configuration being confirmed is the last one appended
                if session
                    .configured_services
                    .last()
                    .is_some_and(|service| service.service_name == definition.name)
                {
                    session.configured_services.pop();
                }
                session.begin_service(definition.name.clone());
                Ok(TurnReply::message(format!(
                    "No problem, let's go through {} again.\n\n{}",
                    definition.display_name,
                    messages::field_prompt(definition, 0)
                )))
            }
            ReplyIntent::Restart | ReplyIntent::Unknown => Err(DialogueError::State {
                mode: session.mode,
                help: if session.current_service.is_some() {
                    messages::CONFIRMATION_HELP.to_string()
                } else {
                    messages::QUOTE_FOLLOW_UP.to_string()
                },
            }),
        }
    }

    fn complete_service(
        &self,
        session: &mut DialogueSession,
        definition: &ServiceDefinition,
    ) -> TurnReply {
        let configured = self.cpq.configure(definition, session.collected_fields.clone());
        let pricing = self.cpq.calculate(&definition.name, &configured.field_values);
        let summary = messages::service_summary(definition, &configured, &pricing);

        session.configured_services.push(configured);
        session.mode = DialogueMode::ManualConfirmation;

        TurnReply::message(format!("{summary}\n\n{}", messages::CONFIRMATION_HELP))
    }

    fn current_definition(&self, session: &DialogueSession) -> Option<&'a ServiceDefinition> {
        let name = session.current_service.as_deref()?;
        self.cpq.catalog().get(name).ok()
    }

    fn mentioned_services(&self, text: &str) -> Vec<&'a ServiceDefinition> {
        let tokens = tokenize(&text.to_lowercase());
        self.cpq
            .catalog()
            .list()
            .iter()
            .filter(|definition| tokens.iter().any(|token| definition.is_named_by(token)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::cpq::CpqRuntime;
    use crate::domain::session::{DialogueMode, DialogueSession, SessionId};
    use crate::errors::DialogueError;
    use crate::flows::intent::KeywordReplyClassifier;
    use crate::flows::states::ElicitationState;

    use super::FieldElicitation;

    fn session() -> DialogueSession {
        let mut session = DialogueSession::new(SessionId("elicit-1".to_string()));
        session.mode = DialogueMode::ManualServiceSelection;
        session
    }

    fn submit_all(
        machine: &FieldElicitation<'_>,
        session: &mut DialogueSession,
        answers: &[&str],
    ) -> String {
        let mut last = String::new();
        for answer in answers {
            last = machine.submit_field_value(session, answer).expect("answer accepted").message;
        }
        last
    }

    const ECS_ANSWERS: &[&str] = &["ecs.g6.large", "2", "100", "10"];
    const OSS_ANSWERS: &[&str] = &["500", "zrs", "media uploads"];

    #[test]
    fn happy_path_walks_every_field_and_configures_exact_keys() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);

        for definition in cpq.catalog().list() {
            let mut session = session();
            machine.select_service(&mut session, &definition.name).expect("service selected");

            for (index, field) in definition.fields.iter().enumerate() {
                assert_eq!(ElicitationState::of(&session), Some(ElicitationState::FieldInput(index)));
                let answer = field.default.clone().expect("default catalog fields have defaults");
                machine.submit_field_value(&mut session, &answer).expect("default is valid");
            }

            assert_eq!(ElicitationState::of(&session), Some(ElicitationState::ConfirmationPending));
            let configured = session.configured_services.last().expect("configured service");
            let keys = configured.field_values.keys().map(String::as_str).collect::<Vec<_>>();
            let mut expected = definition.field_keys().collect::<Vec<_>>();
            expected.sort_unstable();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn completion_summary_shows_service_breakdown() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "I need ECS").expect("ecs selected");
        let summary = submit_all(&machine, &mut session, ECS_ANSWERS);

        assert!(summary.contains("Monthly subtotal: SAR 1198.80"));
        assert!(summary.contains("VAT: SAR 179.82"));
        assert!(summary.contains("Total: SAR 1378.62"));
        assert_eq!(session.configured_services[0].monthly_cost, Decimal::new(119_880, 2));
    }

    #[test]
    fn out_of_range_count_keeps_field_index() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "ecs").expect("ecs selected");
        machine.submit_field_value(&mut session, "ecs.g6.large").expect("type accepted");
        let before = session.clone();

        let error = machine.submit_field_value(&mut session, "0").expect_err("0 is below min");

        assert!(matches!(error, DialogueError::Validation { ref field, .. } if field == "count"));
        assert!(error.user_message().contains("from 1 to 100"));
        assert_eq!(session, before);
        assert_eq!(session.current_field_index, 1);
    }

    #[test]
    fn unknown_option_reprompts_with_allowed_values() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "ecs").expect("ecs selected");
        let error = machine.submit_field_value(&mut session, "m5.large").expect_err("not an option");

        assert!(error.user_message().contains("ecs.t6.small"));
        assert_eq!(session.current_field_index, 0);
    }

    #[test]
    fn unknown_service_reprompts_with_menu_and_keeps_state() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();
        let before = session.clone();

        let error = machine.select_service(&mut session, "a CDN please").expect_err("no match");

        assert!(matches!(error, DialogueError::NotFound { .. }));
        assert!(error.user_message().contains("rds"));
        assert_eq!(session, before);
    }

    #[test]
    fn several_services_in_one_message_are_never_configured_together() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        let reply = machine.select_service(&mut session, "ECS and OSS").expect("asks to pick");

        assert!(reply.message.contains("one service at a time"));
        assert_eq!(session.mode, DialogueMode::ManualServiceSelection);
        assert!(session.current_service.is_none());
    }

    #[test]
    fn add_more_then_confirm_quotes_both_services_with_single_vat() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "ecs").expect("ecs");
        submit_all(&machine, &mut session, ECS_ANSWERS);
        machine.handle_confirmation(&mut session, "Add more services").expect("add more");
        assert_eq!(session.mode, DialogueMode::ManualServiceSelection);
        assert_eq!(session.configured_services.len(), 1);

        machine.select_service(&mut session, "oss").expect("oss");
        submit_all(&machine, &mut session, OSS_ANSWERS);
        let reply = machine.handle_confirmation(&mut session, "Yes").expect("confirmed");

        let quote = reply.quote.expect("quote attached");
        let pre_vat: Decimal = session.configured_services.iter().map(|s| s.monthly_cost).sum();
        assert_eq!(session.configured_services.len(), 2);
        assert_eq!(quote.services.len(), 2);
        assert_eq!(quote.pricing.subtotal, Decimal::from(1274));
        assert_eq!(pre_vat, Decimal::new(12_738, 1));
        assert_eq!(quote.pricing.total, quote.pricing.subtotal * Decimal::new(115, 2));
    }

    #[test]
    fn modify_restarts_fields_and_resubmission_is_idempotent() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "ecs").expect("ecs");
        submit_all(&machine, &mut session, ECS_ANSWERS);
        let first = session.configured_services.clone();

        machine.handle_confirmation(&mut session, "modify").expect("modify");
        assert_eq!(ElicitationState::of(&session), Some(ElicitationState::FieldInput(0)));
        assert!(session.collected_fields.is_empty());
        assert!(session.configured_services.is_empty());

        submit_all(&machine, &mut session, &["ECS.G6.LARGE", "2", "100", "10"]);
        assert_eq!(session.configured_services, first);
    }

    #[test]
    fn modify_preserves_previously_confirmed_services() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "oss").expect("oss");
        submit_all(&machine, &mut session, OSS_ANSWERS);
        machine.handle_confirmation(&mut session, "add another").expect("add more");
        machine.select_service(&mut session, "ecs").expect("ecs");
        submit_all(&machine, &mut session, ECS_ANSWERS);

        machine.handle_confirmation(&mut session, "change it").expect("modify");

        assert_eq!(session.configured_services.len(), 1);
        assert_eq!(session.configured_services[0].service_name, "oss");
        assert_eq!(session.current_service.as_deref(), Some("ecs"));
    }

    #[test]
    fn unrecognised_confirmation_reply_returns_help_without_state_change() {
        let cpq = CpqRuntime::default();
        let classifier = KeywordReplyClassifier;
        let machine = FieldElicitation::new(&cpq, &classifier);
        let mut session = session();

        machine.select_service(&mut session, "ecs").expect("ecs");
        submit_all(&machine, &mut session, ECS_ANSWERS);
        let before = session.clone();

        let error = machine
            .handle_confirmation(&mut session, "I run a bakery website with 500 visitors a day")
            .expect_err("not a confirmation reply");

        assert!(matches!(error, DialogueError::State { mode: DialogueMode::ManualConfirmation, .. }));
        assert!(error.user_message().contains("'yes'"));
        assert_eq!(session, before);
    }
}
