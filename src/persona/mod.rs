//! Persona registry: character definitions loaded once at startup.
//!
//! Builtin personas ship as a TOML data file compiled into the binary. A
//! replacement file can be supplied through `personas_file` in the config.
//! Either way the table is validated when it is loaded and is read-only
//! afterwards, so lookups need no locking.
//!
//! Unknown ids are a client error: `lookup` never substitutes a default.

use crate::error::{Error, Result};
use crate::store::CharacterProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Builtin persona table.
pub const BUILTIN_PERSONAS: &str = include_str!("personas.toml");

/// Opening words of every builtin guardrail refusal. The `success` test
/// category fails replies that start with it.
pub const REFUSAL_PHRASE: &str = "I can't help with that";

/// Persona used when a request does not name one.
pub const DEFAULT_PERSONA_ID: &str = "friendly_teacher";

// ── Data model ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub tone: String,
    pub system_prompt: String,
}

/// Where a persona came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaSource {
    Builtin,
    Custom,
}

/// Display metadata. Never carries the system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    pub role: String,
    pub origin: Option<String>,
    pub avatar: Option<String>,
    pub traits: Vec<String>,
    pub tone: String,
    pub source: PersonaSource,
}

/// Metadata plus the full prompt, served by the single-character endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDetail {
    #[serde(flatten)]
    pub summary: PersonaSummary,
    pub system_prompt: String,
}

impl Persona {
    pub fn summary(&self, source: PersonaSource) -> PersonaSummary {
        PersonaSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            origin: self.origin.clone(),
            avatar: self.avatar.clone(),
            traits: self.traits.clone(),
            tone: self.tone.clone(),
            source,
        }
    }

    pub fn detail(&self, source: PersonaSource) -> PersonaDetail {
        PersonaDetail {
            summary: self.summary(source),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PersonaFile {
    #[serde(default)]
    persona: Vec<Persona>,
}

#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
    index: HashMap<String, usize>,
}

impl PersonaRegistry {
    /// Registry built from the compiled-in table.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_PERSONAS)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read personas file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: PersonaFile = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("invalid personas table: {e}")))?;
        Self::from_personas(file.persona)
    }

    /// Validate and index a persona list. Order is preserved for `list`.
    pub fn from_personas(personas: Vec<Persona>) -> Result<Self> {
        if personas.is_empty() {
            return Err(Error::Config("personas table is empty".into()));
        }

        let mut cleaned = Vec::with_capacity(personas.len());
        let mut index = HashMap::with_capacity(personas.len());
        for (position, mut persona) in personas.into_iter().enumerate() {
            persona.id = persona.id.trim().to_string();
            persona.system_prompt = persona.system_prompt.trim().to_string();

            if persona.id.is_empty() {
                return Err(Error::Config(format!(
                    "persona #{} is missing an id",
                    position + 1
                )));
            }
            if persona.name.trim().is_empty() {
                return Err(Error::Config(format!(
                    "persona '{}' is missing a name",
                    persona.id
                )));
            }
            if persona.system_prompt.is_empty() {
                return Err(Error::Config(format!(
                    "persona '{}' is missing a system_prompt",
                    persona.id
                )));
            }
            if index.insert(persona.id.clone(), position).is_some() {
                return Err(Error::Config(format!(
                    "duplicate persona id '{}'",
                    persona.id
                )));
            }
            cleaned.push(persona);
        }

        Ok(Self {
            personas: cleaned,
            index,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.index.get(id).map(|&i| &self.personas[i])
    }

    /// Fails closed with `NotFound` for ids outside the registry.
    pub fn lookup(&self, id: &str) -> Result<&Persona> {
        self.get(id).ok_or_else(|| Error::not_found("character", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn list(&self) -> Vec<PersonaSummary> {
        self.personas
            .iter()
            .map(|p| p.summary(PersonaSource::Builtin))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

// ── Custom characters ────────────────────────────────────────────────────────

/// Build a system prompt for a user-defined character that did not provide
/// one. The guardrail clause matches the builtin personas so the same test
/// heuristics apply.
pub fn compose_system_prompt(profile: &CharacterProfile) -> String {
    let mut prompt = format!("You are {}, {}.", profile.name, profile.role);

    if !profile.personality_traits.is_empty() {
        prompt.push_str(&format!(
            "\nYour personality traits: {}.",
            profile.personality_traits.join(", ")
        ));
    }
    if !profile.tone_of_voice.trim().is_empty() {
        prompt.push_str(&format!("\nTone of voice: {}", profile.tone_of_voice.trim()));
    }
    if let Some(story) = profile.background_story.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nBackground: {}", story.trim()));
    }
    if !profile.intended_use_case.trim().is_empty() {
        prompt.push_str(&format!(
            "\nYou are used for: {}",
            profile.intended_use_case.trim()
        ));
    }
    if !profile.knowledge_boundaries.is_empty() {
        prompt.push_str("\nStay within these knowledge boundaries:");
        for boundary in &profile.knowledge_boundaries {
            prompt.push_str(&format!("\n- {boundary}"));
        }
    }

    prompt.push_str(&format!(
        "\n\nRules:\n\
         1. Stay in character at all times.\n\
         2. If you do not know something, say you don't know and that you are still learning.\n\
         3. If a request is harmful, unsafe, or inappropriate, begin your reply with exactly \
         \"{REFUSAL_PHRASE}\" and suggest something more positive."
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(id: &str, name: &str, prompt: &str) -> Persona {
        Persona {
            id: id.into(),
            name: name.into(),
            role: "Tester".into(),
            origin: None,
            avatar: None,
            traits: vec![],
            tone: String::new(),
            system_prompt: prompt.into(),
        }
    }

    #[test]
    fn builtin_table_loads_and_contains_default() {
        let registry = PersonaRegistry::builtin().unwrap();
        assert!(registry.len() >= 4);
        assert!(registry.contains(DEFAULT_PERSONA_ID));
    }

    #[test]
    fn pirate_captain_is_captain_blackbeard() {
        let registry = PersonaRegistry::builtin().unwrap();
        let pirate = registry.lookup("pirate_captain").unwrap();
        assert_eq!(pirate.name, "Captain Blackbeard");
        assert!(pirate.system_prompt.contains("Ahoy"));
    }

    #[test]
    fn every_builtin_guardrail_uses_refusal_phrase() {
        let registry = PersonaRegistry::builtin().unwrap();
        for summary in registry.list() {
            let persona = registry.lookup(&summary.id).unwrap();
            assert!(
                persona.system_prompt.contains(REFUSAL_PHRASE),
                "{} lacks the refusal phrase",
                persona.id
            );
        }
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = PersonaRegistry::builtin().unwrap();
        assert!(matches!(
            registry.lookup("kraken"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn list_omits_prompt_text() {
        let registry = PersonaRegistry::builtin().unwrap();
        let json = serde_json::to_string(&registry.list()).unwrap();
        assert!(!json.contains("system_prompt"));
        assert!(json.contains("\"source\":\"builtin\""));
    }

    #[test]
    fn list_preserves_file_order() {
        let registry = PersonaRegistry::from_personas(vec![
            persona("b", "Bee", "p"),
            persona("a", "Ay", "p"),
        ])
        .unwrap();
        let ids: Vec<_> = registry.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = PersonaRegistry::from_personas(vec![
            persona("twin", "One", "p"),
            persona("twin", "Two", "p"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let err = PersonaRegistry::from_personas(vec![persona("mute", "Mute", "   ")])
            .unwrap_err();
        assert!(err.to_string().contains("system_prompt"));
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(PersonaRegistry::from_toml_str("").is_err());
    }

    #[test]
    fn toml_entries_need_prompt_field() {
        let raw = r#"
            [[persona]]
            id = "x"
            name = "X"
        "#;
        assert!(matches!(
            PersonaRegistry::from_toml_str(raw),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn detail_flattens_summary_and_prompt() {
        let p = persona("x", "X", "Be X.");
        let json = serde_json::to_value(p.detail(PersonaSource::Custom)).unwrap();
        assert_eq!(json["id"], "x");
        assert_eq!(json["system_prompt"], "Be X.");
        assert_eq!(json["source"], "custom");
    }

    #[test]
    fn composed_prompt_carries_profile_and_guardrail() {
        let profile = CharacterProfile {
            name: "Sage".into(),
            role: "a gardening coach".into(),
            personality_traits: vec!["calm".into(), "practical".into()],
            tone_of_voice: "Soft and slow.".into(),
            knowledge_boundaries: vec!["Only gardening topics".into()],
            intended_use_case: "Beginner gardeners".into(),
            ..CharacterProfile::default()
        };
        let prompt = compose_system_prompt(&profile);
        assert!(prompt.starts_with("You are Sage, a gardening coach."));
        assert!(prompt.contains("calm, practical"));
        assert!(prompt.contains("- Only gardening topics"));
        assert!(prompt.contains(REFUSAL_PHRASE));
    }
}
