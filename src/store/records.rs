use crate::conversation::{timestamp, Turn};
use crate::evaluation::Verdict;
use crate::persona::{compose_system_prompt, Persona};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anything a [`Repository`](super::Repository) can hold.
pub trait Record: Clone + Send + Sync + 'static {
    /// Collection name used in `NotFound` errors.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

// ── Characters ───────────────────────────────────────────────────────────────

/// A user-defined character, stored alongside the builtin personas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub tone_of_voice: String,
    #[serde(default)]
    pub knowledge_boundaries: Vec<String>,
    #[serde(default)]
    pub intended_use_case: String,
    #[serde(default)]
    pub background_story: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CharacterProfile {
    /// Persona view used for chat. An explicit non-blank system prompt wins;
    /// otherwise one is composed from the profile fields.
    pub fn to_persona(&self) -> Persona {
        let system_prompt = self
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| compose_system_prompt(self));

        Persona {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            origin: None,
            avatar: self.avatar.clone(),
            traits: self.personality_traits.clone(),
            tone: self.tone_of_voice.clone(),
            system_prompt,
        }
    }
}

impl Record for CharacterProfile {
    const KIND: &'static str = "character";

    fn id(&self) -> &str {
        &self.id
    }
}

// ── Conversations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub character_id: String,
    pub title: String,
    pub messages: Vec<Turn>,
    #[serde(default)]
    pub test_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Conversation {
    const KIND: &'static str = "conversation";

    fn id(&self) -> &str {
        &self.id
    }
}

// ── Test results ─────────────────────────────────────────────────────────────

/// One persona test evaluation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    /// Raw category as submitted; unknown names are kept and judged
    /// indeterminate.
    pub test_type: String,
    pub title: String,
    pub character_id: String,
    pub message: String,
    #[serde(default)]
    pub expected_behavior: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub response: String,
    pub verdict: Verdict,
    /// `verdict` as a tri-state boolean for simple clients.
    pub passed: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl Record for TestResult {
    const KIND: &'static str = "test result";

    fn id(&self) -> &str {
        &self.id
    }
}
