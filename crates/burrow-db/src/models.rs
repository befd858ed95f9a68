use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

impl FromStr for MessageRole {
    type Err = MessageRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(MessageRoleParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MessageRole`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid message role: {0:?}")]
pub struct MessageRoleParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A user-owned container for conversations. Each project maps to one
/// sandbox directory on disk.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
}

/// One agent session within a project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Resumption token handed out by the agent runtime. Stored verbatim and
    /// never interpreted here.
    pub session_id: Option<String>,
    pub cluster_id: Option<String>,
}

/// A single transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_error: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_display_roundtrip() {
        for v in [MessageRole::User, MessageRole::Assistant] {
            let parsed: MessageRole = v.to_string().parse().expect("should parse");
            assert_eq!(v, parsed);
        }
    }

    #[test]
    fn message_role_invalid() {
        let err = "system".parse::<MessageRole>().unwrap_err();
        assert_eq!(err.to_string(), "invalid message role: \"system\"");
    }

    #[test]
    fn message_role_serializes_lowercase() {
        let json = serde_json::to_value(MessageRole::Assistant).unwrap();
        assert_eq!(json, serde_json::json!("assistant"));
    }

    #[test]
    fn conversation_serializes_null_session() {
        let conv = Conversation {
            id: Uuid::nil(),
            project_id: Uuid::nil(),
            title: "hi".to_owned(),
            created_at: Utc::now(),
            session_id: None,
            cluster_id: None,
        };
        let json = serde_json::to_value(&conv).unwrap();
        assert!(json["session_id"].is_null());
        assert_eq!(json["title"], "hi");
    }
}
