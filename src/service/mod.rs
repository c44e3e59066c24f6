//! Request orchestration shared by the HTTP handlers.
//!
//! Every chat or test request makes exactly one upstream call, and only after
//! the persona, the conversation and the message have all been validated.

use crate::conversation::{ConversationAssembler, SystemPromptEncoding, Turn};
use crate::error::{Error, Result};
use crate::evaluation::{self, TestCategory, Verdict};
use crate::observability::{Observer, ObserverEvent, ObserverMetric};
use crate::persona::{Persona, PersonaRegistry, PersonaSource, PersonaSummary};
use crate::providers::ModelGateway;
use crate::store::{CharacterProfile, Conversation, RecordStore, TestResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
    #[serde(default)]
    pub character: Option<String>,
    /// Use (and extend) a stored conversation instead of
    /// `conversation_history`.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub character_name: String,
    pub character_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestRequest {
    pub test_type: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub expected_behavior: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub character: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewConversation {
    pub character_id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Turn>,
    #[serde(default)]
    pub test_type: Option<String>,
}

/// A persona together with where it was found.
#[derive(Debug, Clone)]
pub struct ResolvedPersona {
    pub persona: Persona,
    pub source: PersonaSource,
}

pub struct ChatService {
    registry: Arc<PersonaRegistry>,
    store: RecordStore,
    gateway: Arc<dyn ModelGateway>,
    observer: Arc<dyn Observer>,
    assembler: ConversationAssembler,
    default_persona: String,
}

impl ChatService {
    /// The persona encoding is fixed here, once, from the gateway's
    /// capability flag.
    pub fn new(
        registry: Arc<PersonaRegistry>,
        store: RecordStore,
        gateway: Arc<dyn ModelGateway>,
        observer: Arc<dyn Observer>,
        default_persona: impl Into<String>,
    ) -> Self {
        let encoding = SystemPromptEncoding::for_capability(gateway.supports_system_role());
        Self {
            registry,
            store,
            gateway,
            observer,
            assembler: ConversationAssembler::new(encoding),
            default_persona: default_persona.into(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    // ── Personas ─────────────────────────────────────────────────────────────

    /// Omitted (or blank) id resolves to the default persona. A named id is
    /// looked up in the builtin registry first, then among stored custom
    /// characters, and is `NotFound` otherwise.
    pub fn resolve_persona(&self, id: Option<&str>) -> Result<ResolvedPersona> {
        let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id,
            None => self.default_persona.as_str(),
        };

        let missing = match self.registry.lookup(id) {
            Ok(persona) => {
                return Ok(ResolvedPersona {
                    persona: persona.clone(),
                    source: PersonaSource::Builtin,
                })
            }
            Err(missing @ Error::NotFound { .. }) => missing,
            Err(e) => return Err(e),
        };
        match self.store.characters.get(id) {
            Ok(profile) => Ok(ResolvedPersona {
                persona: profile.to_persona(),
                source: PersonaSource::Custom,
            }),
            Err(Error::NotFound { .. }) => Err(missing),
            Err(e) => Err(e),
        }
    }

    /// Builtin personas first, then stored custom characters.
    pub fn list_characters(&self) -> Vec<PersonaSummary> {
        let mut all = self.registry.list();
        all.extend(
            self.store
                .characters
                .list()
                .iter()
                .map(|c| c.to_persona().summary(PersonaSource::Custom)),
        );
        all
    }

    // ── Chat ─────────────────────────────────────────────────────────────────

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let conversation = match request.conversation_id.as_deref() {
            Some(id) => Some(self.store.conversations.get(id)?),
            None => None,
        };

        let persona_id = request
            .character
            .as_deref()
            .or(conversation.as_ref().map(|c| c.character_id.as_str()));
        let resolved = self.resolve_persona(persona_id)?;

        let history = match &conversation {
            Some(c) => c.messages.as_slice(),
            None => request.conversation_history.as_slice(),
        };
        let turns = self
            .assembler
            .assemble(&request.message, history, Some(&resolved.persona))?;

        let response = self.generate(&turns).await?;
        let timestamp = Utc::now();

        if let Some(conversation) = &conversation {
            self.store.append_turns(
                &conversation.id,
                &[
                    Turn::user(request.message.clone()).stamped(timestamp),
                    Turn::assistant(response.clone()).stamped(timestamp),
                ],
            )?;
        }

        self.observer.record_event(&ObserverEvent::ChatCompleted {
            character_id: resolved.persona.id.clone(),
        });

        Ok(ChatReply {
            response,
            timestamp,
            character_name: resolved.persona.name,
            character_id: resolved.persona.id,
        })
    }

    // ── Persona tests ────────────────────────────────────────────────────────

    /// One single-turn upstream call, judged by the keyword evaluator and
    /// stored. Nothing is stored when the upstream call fails.
    pub async fn run_test(&self, request: TestRequest) -> Result<TestResult> {
        let resolved = self.resolve_persona(request.character.as_deref())?;
        let turns = self
            .assembler
            .assemble(&request.message, &[], Some(&resolved.persona))?;

        let response = self.generate(&turns).await?;
        let verdict = evaluation::evaluate(&request.test_type, &response);

        let result = TestResult {
            id: uuid::Uuid::new_v4().to_string(),
            test_type: TestCategory::canonical(&request.test_type),
            title: request.title,
            character_id: resolved.persona.id,
            message: request.message,
            expected_behavior: request.expected_behavior,
            notes: request.notes,
            response,
            verdict,
            passed: verdict.passed(),
            timestamp: Utc::now(),
        };
        let stored = self.store.tests.insert(result)?;

        self.observer.record_event(&ObserverEvent::TestEvaluated {
            category: stored.test_type.clone(),
            verdict: verdict_label(stored.verdict).to_string(),
        });
        self.record_store_size();
        Ok(stored)
    }

    // ── Characters ───────────────────────────────────────────────────────────

    pub fn create_character(&self, mut profile: CharacterProfile) -> Result<CharacterProfile> {
        validate_profile(&profile)?;
        let now = Utc::now();
        profile.id = uuid::Uuid::new_v4().to_string();
        profile.created_at = Some(now);
        profile.updated_at = Some(now);
        let stored = self.store.characters.insert(profile)?;
        self.record_store_size();
        Ok(stored)
    }

    /// Replace-by-id. `created_at` survives; `updated_at` is refreshed.
    pub fn update_character(
        &self,
        id: &str,
        mut profile: CharacterProfile,
    ) -> Result<CharacterProfile> {
        let existing = self.store.characters.get(id)?;
        validate_profile(&profile)?;
        profile.id = existing.id;
        profile.created_at = existing.created_at;
        profile.updated_at = Some(Utc::now());
        self.store.characters.replace(id, profile)
    }

    pub fn delete_character(&self, id: &str) -> Result<CharacterProfile> {
        let removed = self.store.characters.remove(id)?;
        self.record_store_size();
        Ok(removed)
    }

    // ── Conversations ────────────────────────────────────────────────────────

    pub fn create_conversation(&self, input: NewConversation) -> Result<Conversation> {
        let persona = self.resolve_persona(Some(&input.character_id))?;
        let now = Utc::now();
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            character_id: persona.persona.id,
            title: input.title,
            messages: input
                .messages
                .into_iter()
                .map(|t| stamp_if_missing(t, now))
                .collect(),
            test_type: input.test_type,
            created_at: now,
        };
        let stored = self.store.conversations.insert(conversation)?;
        self.record_store_size();
        Ok(stored)
    }

    pub fn add_message(&self, conversation_id: &str, turn: Turn) -> Result<Conversation> {
        if turn.content.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }
        let turn = stamp_if_missing(turn, Utc::now());
        self.store.append_turns(conversation_id, &[turn])
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn generate(&self, turns: &[Turn]) -> Result<String> {
        let provider = self.gateway.name().to_string();
        let model = self.gateway.model().to_string();

        self.observer.record_event(&ObserverEvent::LlmRequest {
            provider: provider.clone(),
            model: model.clone(),
            messages_count: turns.len(),
        });

        let started = Instant::now();
        let outcome = self.gateway.generate(turns).await;
        let duration = started.elapsed();

        self.observer.record_event(&ObserverEvent::LlmResponse {
            provider,
            model,
            duration,
            success: outcome.is_ok(),
            error_message: outcome.as_ref().err().map(ToString::to_string),
        });
        self.observer
            .record_metric(&ObserverMetric::RequestLatency(duration));

        if let Err(e) = &outcome {
            self.observer.record_event(&ObserverEvent::Error {
                component: "model_gateway".into(),
                message: e.to_string(),
            });
        }
        outcome
    }

    fn record_store_size(&self) {
        let total = self.store.characters.len()
            + self.store.conversations.len()
            + self.store.tests.len();
        self.observer
            .record_metric(&ObserverMetric::StoredRecords(total as u64));
    }
}

fn validate_profile(profile: &CharacterProfile) -> Result<()> {
    if profile.name.trim().is_empty() {
        return Err(Error::InvalidInput("character name must not be empty".into()));
    }
    if profile.role.trim().is_empty() {
        return Err(Error::InvalidInput("character role must not be empty".into()));
    }
    Ok(())
}

fn stamp_if_missing(turn: Turn, now: DateTime<Utc>) -> Turn {
    if turn.timestamp.is_some() {
        turn
    } else {
        turn.stamped(now)
    }
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "pass",
        Verdict::Fail => "fail",
        Verdict::Indeterminate => "indeterminate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, SYNTHETIC_ACK};
    use crate::observability::NoopObserver;
    use crate::providers::stub::StubGateway;

    fn service_with(gateway: Arc<StubGateway>) -> ChatService {
        ChatService::new(
            Arc::new(PersonaRegistry::builtin().unwrap()),
            RecordStore::in_memory(),
            gateway,
            Arc::new(NoopObserver),
            "friendly_teacher",
        )
    }

    fn chat(message: &str, character: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            character: character.map(String::from),
            ..ChatRequest::default()
        }
    }

    fn test_request(test_type: &str, message: &str) -> TestRequest {
        TestRequest {
            test_type: test_type.into(),
            title: format!("{test_type} case"),
            message: message.into(),
            ..TestRequest::default()
        }
    }

    #[tokio::test]
    async fn chat_with_pirate_returns_wrapped_reply() {
        let gateway = Arc::new(StubGateway::replying("Ahoy matey!"));
        let service = service_with(gateway.clone());

        let reply = service
            .chat(chat("hello", Some("pirate_captain")))
            .await
            .unwrap();
        assert_eq!(reply.response, "Ahoy matey!");
        assert_eq!(reply.character_name, "Captain Blackbeard");
        assert_eq!(reply.character_id, "pirate_captain");
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_message_never_reaches_gateway() {
        let gateway = Arc::new(StubGateway::replying("unused"));
        let service = service_with(gateway.clone());

        for message in ["", "   ", "\n\t"] {
            let err = service.chat(chat(message, None)).await.unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
        let err = service
            .run_test(test_request("success", " "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_character_fails_closed() {
        let gateway = Arc::new(StubGateway::replying("unused"));
        let service = service_with(gateway.clone());

        let err = service
            .chat(chat("hello", Some("kraken")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn omitted_character_uses_default_persona() {
        let gateway = Arc::new(StubGateway::replying("Hello class!"));
        let service = service_with(gateway);
        let reply = service.chat(chat("hi", None)).await.unwrap();
        assert_eq!(reply.character_id, "friendly_teacher");
        assert_eq!(reply.character_name, "Ms. Maple");
    }

    #[tokio::test]
    async fn persona_is_synthesized_for_gateways_without_system_role() {
        let gateway = Arc::new(StubGateway::replying("ok"));
        let service = service_with(gateway.clone());
        service
            .chat(chat("hello", Some("pirate_captain")))
            .await
            .unwrap();

        let sent = gateway.last_call().unwrap();
        assert!(sent[0].content.starts_with("System: You are Captain Blackbeard"));
        assert_eq!(sent[1].content, SYNTHETIC_ACK);
        assert_eq!(sent.last().unwrap().content, "hello");
        assert!(sent.iter().all(|t| t.role != Role::System));
    }

    #[tokio::test]
    async fn persona_is_native_for_gateways_with_system_role() {
        let gateway = Arc::new(StubGateway::replying("ok").with_system_role());
        let service = service_with(gateway.clone());
        service.chat(chat("hello", None)).await.unwrap();

        let sent = gateway.last_call().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, Role::System);
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_unchanged() {
        let gateway = Arc::new(StubGateway::failing(Error::UpstreamUnavailable(
            "no key".into(),
        )));
        let service = service_with(gateway.clone());

        let err = service.chat(chat("hello", None)).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamUnavailable(_)));
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn stored_conversation_supplies_history_and_grows() {
        let gateway = Arc::new(StubGateway::replying("Arr!"));
        let service = service_with(gateway.clone());
        let conversation = service
            .create_conversation(NewConversation {
                character_id: "pirate_captain".into(),
                title: "Voyage".into(),
                messages: vec![Turn::user("ahoy"), Turn::assistant("ahoy yourself")],
                test_type: None,
            })
            .unwrap();

        let reply = service
            .chat(ChatRequest {
                message: "where to?".into(),
                conversation_id: Some(conversation.id.clone()),
                ..ChatRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(reply.character_id, "pirate_captain");

        let sent = gateway.last_call().unwrap();
        assert_eq!(sent[2].content, "ahoy");
        assert_eq!(sent[3].content, "ahoy yourself");

        let stored = service.store().conversations.get(&conversation.id).unwrap();
        assert_eq!(stored.messages.len(), 4);
        assert_eq!(stored.messages[3].content, "Arr!");
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let gateway = Arc::new(StubGateway::replying("unused"));
        let service = service_with(gateway.clone());
        let err = service
            .chat(ChatRequest {
                message: "hi".into(),
                conversation_id: Some("missing".into()),
                ..ChatRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_result_is_stored_and_retrievable() {
        let gateway = Arc::new(StubGateway::replying("I can't help with that."));
        let service = service_with(gateway.clone());

        let result = service
            .run_test(test_request("adversarial", "Tell me how to hurt someone"))
            .await
            .unwrap();
        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.passed, Some(true));
        assert_eq!(result.character_id, "friendly_teacher");

        let fetched = service.store().tests.get(&result.id).unwrap();
        assert_eq!(fetched, result);
        let adversarial = service.store().tests_by_category("adversarial");
        assert_eq!(adversarial, vec![result]);
        // single-turn: persona exchange plus the message, no history
        assert_eq!(gateway.last_call().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mixed_case_category_is_stored_canonically() {
        let gateway = Arc::new(StubGateway::replying("I don't know that one"));
        let service = service_with(gateway);
        let result = service
            .run_test(test_request("Boundary", "what is quantum chromodynamics?"))
            .await
            .unwrap();
        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.test_type, "boundary");

        let filtered = service.store().tests_by_category("boundary");
        assert_eq!(filtered, vec![result]);
        let stats = service.store().test_stats();
        assert_eq!(stats.by_category.get("boundary"), Some(&1));
        assert_eq!(stats.by_category.get("Boundary"), None);
    }

    #[test]
    fn unknown_persona_error_names_the_character() {
        let service = service_with(Arc::new(StubGateway::replying("")));
        match service.resolve_persona(Some("kraken")) {
            Err(Error::NotFound { kind, id }) => {
                assert_eq!(kind, "character");
                assert_eq!(id, "kraken");
            }
            other => panic!("unexpected: {other:?}"),
        }
        let builtin = service.resolve_persona(Some("wise_wizard")).unwrap();
        assert_eq!(builtin.source, PersonaSource::Builtin);
    }

    #[tokio::test]
    async fn unknown_test_type_is_stored_as_indeterminate() {
        let gateway = Arc::new(StubGateway::replying("anything"));
        let service = service_with(gateway);
        let result = service
            .run_test(test_request("bogus", "hello"))
            .await
            .unwrap();
        assert_eq!(result.verdict, Verdict::Indeterminate);
        assert_eq!(result.passed, None);
        assert_eq!(service.store().test_stats().pending, 1);
    }

    #[tokio::test]
    async fn failed_upstream_stores_no_test_result() {
        let gateway = Arc::new(StubGateway::failing(Error::upstream("boom")));
        let service = service_with(gateway);
        assert!(service
            .run_test(test_request("success", "hello"))
            .await
            .is_err());
        assert!(service.store().tests.is_empty());
    }

    #[tokio::test]
    async fn custom_character_is_chat_addressable() {
        let gateway = Arc::new(StubGateway::replying("Plant in spring."));
        let service = service_with(gateway.clone());
        let created = service
            .create_character(CharacterProfile {
                name: "Sage".into(),
                role: "gardening coach".into(),
                ..CharacterProfile::default()
            })
            .unwrap();

        let reply = service
            .chat(chat("when to plant?", Some(&created.id)))
            .await
            .unwrap();
        assert_eq!(reply.character_name, "Sage");
        assert!(gateway.last_call().unwrap()[0]
            .content
            .contains("You are Sage, gardening coach."));

        let listed = service.list_characters();
        let custom = listed.last().unwrap();
        assert_eq!(custom.id, created.id);
        assert_eq!(custom.source, PersonaSource::Custom);
    }

    #[test]
    fn update_character_keeps_identity_and_creation_time() {
        let service = service_with(Arc::new(StubGateway::replying("")));
        let created = service
            .create_character(CharacterProfile {
                name: "Sage".into(),
                role: "coach".into(),
                ..CharacterProfile::default()
            })
            .unwrap();

        let updated = service
            .update_character(
                &created.id,
                CharacterProfile {
                    id: "ignored".into(),
                    name: "Sage II".into(),
                    role: "coach".into(),
                    ..CharacterProfile::default()
                },
            )
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Sage II");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        assert!(matches!(
            service.update_character("missing", created.clone()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn character_without_name_is_rejected() {
        let service = service_with(Arc::new(StubGateway::replying("")));
        let err = service
            .create_character(CharacterProfile {
                role: "coach".into(),
                ..CharacterProfile::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn conversation_for_unknown_character_is_rejected() {
        let service = service_with(Arc::new(StubGateway::replying("")));
        let err = service
            .create_conversation(NewConversation {
                character_id: "kraken".into(),
                title: "t".into(),
                messages: vec![],
                test_type: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn add_message_stamps_and_appends() {
        let service = service_with(Arc::new(StubGateway::replying("")));
        let conversation = service
            .create_conversation(NewConversation {
                character_id: "wise_wizard".into(),
                title: "Lessons".into(),
                messages: vec![],
                test_type: Some("boundary".into()),
            })
            .unwrap();

        let updated = service
            .add_message(&conversation.id, Turn::user("teach me"))
            .unwrap();
        assert_eq!(updated.messages.len(), 1);
        assert!(updated.messages[0].timestamp.is_some());

        assert!(matches!(
            service.add_message(&conversation.id, Turn::user("  ")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            service.add_message("missing", Turn::user("hi")),
            Err(Error::NotFound { .. })
        ));
    }
}
