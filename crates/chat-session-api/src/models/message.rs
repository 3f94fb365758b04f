//! Conversation message model
//!
//! A [`Message`] is a role-tagged piece of text. In memory it is always the
//! structured value; the `"role:content"` string form only exists at the
//! boundary for callers and stores that speak it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(SessionError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Parse the `"role:content"` form. Only the first colon splits, so the
    /// content may contain colons of its own.
    pub fn parse_tagged(encoded: &str) -> Result<Self, SessionError> {
        let (role, content) = encoded
            .split_once(':')
            .ok_or_else(|| SessionError::InvalidRole(encoded.to_string()))?;
        Ok(Self::new(role.parse()?, content))
    }

    pub fn to_tagged(&self) -> String {
        format!("{}:{}", self.role, self.content)
    }

    pub fn to_json(&self) -> String {
        // A struct of an enum and a String always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| self.to_tagged())
    }

    /// Decode a stored entry: structured JSON first, tagged form as fallback.
    pub fn decode(entry: &str) -> Result<Self, SessionError> {
        if entry.starts_with('{') {
            if let Ok(message) = serde_json::from_str::<Message>(entry) {
                return Ok(message);
            }
        }
        Self::parse_tagged(entry)
    }
}

impl FromStr for Message {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_tagged(s)
    }
}

/// Wire form written by the history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageEncoding {
    #[default]
    Json,
    Tagged,
}

impl MessageEncoding {
    pub fn encode(&self, message: &Message) -> String {
        match self {
            MessageEncoding::Json => message.to_json(),
            MessageEncoding::Tagged => message.to_tagged(),
        }
    }
}
