//! Conversation assembly: the ordered turn list sent upstream for one request.
//!
//! Output order is fixed: persona context, then the trailing history window
//! in chronological order, then the new user message. Gateways never reorder.

use crate::error::{Error, Result};
use crate::persona::Persona;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prior turns kept per request. Not configurable per call.
pub const HISTORY_WINDOW: usize = 10;

/// Prefix of the synthesized user turn that carries a persona prompt.
pub const SYSTEM_PREFIX: &str = "System: ";

/// Assistant reply that closes the synthesized persona exchange.
pub const SYNTHETIC_ACK: &str =
    "Understood. I will stay in character and follow those instructions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }
}

/// How a persona prompt is placed in front of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPromptEncoding {
    /// One leading system-role turn.
    Native,
    /// `"System: <prompt>"` as a user turn followed by a synthetic assistant
    /// acknowledgment, for upstreams without a system role.
    SynthesizedExchange,
}

impl SystemPromptEncoding {
    pub fn for_capability(supports_system_role: bool) -> Self {
        if supports_system_role {
            Self::Native
        } else {
            Self::SynthesizedExchange
        }
    }
}

/// Builds upstream turn lists with a single, fixed persona encoding.
#[derive(Debug, Clone, Copy)]
pub struct ConversationAssembler {
    encoding: SystemPromptEncoding,
}

impl ConversationAssembler {
    pub fn new(encoding: SystemPromptEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> SystemPromptEncoding {
        self.encoding
    }

    /// Assemble the turns for one upstream call.
    ///
    /// Empty or whitespace-only `user_text` is rejected before anything else
    /// happens. System-role turns in `history` are discarded: the persona is
    /// the only source of system context.
    pub fn assemble(
        &self,
        user_text: &str,
        history: &[Turn],
        persona: Option<&Persona>,
    ) -> Result<Vec<Turn>> {
        if user_text.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }

        let window = history_window(history);
        let mut turns = Vec::with_capacity(window.len() + 3);

        if let Some(persona) = persona {
            match self.encoding {
                SystemPromptEncoding::Native => {
                    turns.push(Turn::system(persona.system_prompt.clone()));
                }
                SystemPromptEncoding::SynthesizedExchange => {
                    turns.push(Turn::user(format!(
                        "{SYSTEM_PREFIX}{}",
                        persona.system_prompt
                    )));
                    turns.push(Turn::assistant(SYNTHETIC_ACK));
                }
            }
        }

        turns.extend(window);
        turns.push(Turn::user(user_text));
        Ok(turns)
    }
}

/// Last `HISTORY_WINDOW` conversational turns in chronological order.
///
/// When every turn carries a timestamp the history is stably sorted by it;
/// otherwise sequence order is taken as chronological.
fn history_window(history: &[Turn]) -> Vec<Turn> {
    let mut prior: Vec<Turn> = history
        .iter()
        .filter(|t| t.role != Role::System)
        .cloned()
        .collect();

    if !prior.is_empty() && prior.iter().all(|t| t.timestamp.is_some()) {
        prior.sort_by_key(|t| t.timestamp);
    }

    let skip = prior.len().saturating_sub(HISTORY_WINDOW);
    prior.split_off(skip)
}

pub mod timestamp {
    //! Lenient timestamp parsing for client-supplied records.
    //!
    //! RFC 3339 is preferred. Timezone-less ISO 8601 values, as written by
    //! older clients, are read as UTC.

    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn deserialize_optional<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse(&raw).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid timestamp '{raw}'"))
            }),
        }
    }
}
