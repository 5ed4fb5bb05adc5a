//! Inter-agent mail records.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Business Enums
// ============================================================================

/// Business meaning of an inter-agent message.
///
/// Closed set written by the orchestrator. Records carry the literal string;
/// this enum exists for the demo generator and for callers that want to
/// branch on known kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Status,
    Question,
    Result,
    Error,
    WorkerDone,
    MergeReady,
    Merged,
    MergeFailed,
    Escalation,
    HealthCheck,
    Dispatch,
    Assign,
}

impl MessageKind {
    /// Returns the stored string form of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Question => "question",
            Self::Result => "result",
            Self::Error => "error",
            Self::WorkerDone => "worker_done",
            Self::MergeReady => "merge_ready",
            Self::Merged => "merged",
            Self::MergeFailed => "merge_failed",
            Self::Escalation => "escalation",
            Self::HealthCheck => "health_check",
            Self::Dispatch => "dispatch",
            Self::Assign => "assign",
        }
    }

    /// Parses a stored kind string. Unknown values return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status" => Some(Self::Status),
            "question" => Some(Self::Question),
            "result" => Some(Self::Result),
            "error" => Some(Self::Error),
            "worker_done" => Some(Self::WorkerDone),
            "merge_ready" => Some(Self::MergeReady),
            "merged" => Some(Self::Merged),
            "merge_failed" => Some(Self::MergeFailed),
            "escalation" => Some(Self::Escalation),
            "health_check" => Some(Self::HealthCheck),
            "dispatch" => Some(Self::Dispatch),
            "assign" => Some(Self::Assign),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery priority of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

// ============================================================================
// Raw Row / Domain Record
// ============================================================================

/// One row of the `messages` table, exactly as persisted.
///
/// The store writes `read` as an integer (SQLite has no boolean column
/// type); the mapper coerces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMailRow {
    pub id: i64,
    pub from_agent: String,
    pub to_agent: String,
    pub subject: String,
    pub body: String,
    pub message_type: String,
    pub priority: String,
    pub thread_id: Option<String>,
    pub read: i64,
    pub created_at: String,
}

/// One inter-agent mail record. Immutable once created.
///
/// Ordering is by `created_at`, ties broken by insertion order in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailRecord {
    pub id: i64,
    pub from_agent: String,
    pub to_agent: String,
    pub subject: String,
    pub body: String,
    /// Business meaning as stored (see [`MessageKind`])
    pub message_type: String,
    /// Priority as stored (see [`MessagePriority`])
    pub priority: String,
    pub thread_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

/// Maps a raw mail row into the domain record.
///
/// `read == 1` coerces to `true`; anything else to `false`.
pub fn map_message(row: RawMailRow) -> MailRecord {
    MailRecord {
        id: row.id,
        from_agent: row.from_agent,
        to_agent: row.to_agent,
        subject: row.subject,
        body: row.body,
        message_type: row.message_type,
        priority: row.priority,
        thread_id: row.thread_id,
        read: row.read == 1,
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_row(read: i64) -> RawMailRow {
        RawMailRow {
            id: 12,
            from_agent: "builder-1".to_string(),
            to_agent: "lead-1".to_string(),
            subject: "tests passing".to_string(),
            body: "all green on bd-101".to_string(),
            message_type: "worker_done".to_string(),
            priority: "normal".to_string(),
            thread_id: Some("th-4".to_string()),
            read,
            created_at: "2025-06-12T10:05:00Z".to_string(),
        }
    }

    #[test]
    fn test_map_message_read_coercion_zero() {
        let record = map_message(fixture_row(0));
        assert!(!record.read);
    }

    #[test]
    fn test_map_message_read_coercion_one() {
        let record = map_message(fixture_row(1));
        assert!(record.read);
    }

    #[test]
    fn test_map_message_read_coercion_other() {
        // Anything that isn't exactly 1 is unread
        let record = map_message(fixture_row(2));
        assert!(!record.read);
        let record = map_message(fixture_row(-1));
        assert!(!record.read);
    }

    #[test]
    fn test_map_message_fields() {
        let record = map_message(fixture_row(1));
        assert_eq!(record.from_agent, "builder-1");
        assert_eq!(record.to_agent, "lead-1");
        assert_eq!(record.message_type, "worker_done");
        assert_eq!(record.thread_id.as_deref(), Some("th-4"));
    }

    #[test]
    fn test_message_kind_roundtrip() {
        for kind in [
            MessageKind::Status,
            MessageKind::Question,
            MessageKind::Result,
            MessageKind::Error,
            MessageKind::WorkerDone,
            MessageKind::MergeReady,
            MessageKind::Merged,
            MessageKind::MergeFailed,
            MessageKind::Escalation,
            MessageKind::HealthCheck,
            MessageKind::Dispatch,
            MessageKind::Assign,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("gossip"), None);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(MessagePriority::parse("urgent"), Some(MessagePriority::Urgent));
        assert_eq!(MessagePriority::parse("whenever"), None);
    }
}
