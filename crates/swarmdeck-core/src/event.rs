//! Observability event records.

use serde::{Deserialize, Serialize};

/// Severity level of an observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One row of the `events` table, exactly as persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEventRow {
    pub id: i64,
    pub run_id: Option<String>,
    pub session_id: Option<String>,
    pub agent_name: String,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<String>,
    pub duration_ms: Option<i64>,
    pub level: String,
    pub payload: Option<String>,
    pub created_at: String,
}

/// One observability record (tool invocation, mail-sent marker, etc.).
///
/// Append-only. Consumers track a monotonically advancing last-seen id
/// rather than a timestamp: several events can share a timestamp and a
/// timestamp cursor would deliver them twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic store id, the delivery cursor
    pub id: i64,
    pub run_id: Option<String>,
    pub session_id: Option<String>,
    pub agent_name: String,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<String>,
    pub duration_ms: Option<i64>,
    /// Severity as stored (see [`EventLevel`])
    pub level: String,
    pub payload: Option<String>,
    pub created_at: String,
}

/// Maps a raw event row into the domain record.
pub fn map_event(row: RawEventRow) -> EventRecord {
    EventRecord {
        id: row.id,
        run_id: row.run_id,
        session_id: row.session_id,
        agent_name: row.agent_name,
        event_type: row.event_type,
        tool_name: row.tool_name,
        tool_args: row.tool_args,
        duration_ms: row.duration_ms,
        level: row.level,
        payload: row.payload,
        created_at: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_event_passthrough() {
        let row = RawEventRow {
            id: 991,
            run_id: Some("run-20250612".to_string()),
            session_id: None,
            agent_name: "scout-1".to_string(),
            event_type: "tool_use".to_string(),
            tool_name: Some("Grep".to_string()),
            tool_args: Some(r#"{"pattern":"fn main"}"#.to_string()),
            duration_ms: Some(240),
            level: "info".to_string(),
            payload: None,
            created_at: "2025-06-12T10:07:12Z".to_string(),
        };
        let record = map_event(row);
        assert_eq!(record.id, 991);
        assert_eq!(record.tool_name.as_deref(), Some("Grep"));
        assert_eq!(record.duration_ms, Some(240));
        assert_eq!(record.level, "info");
    }

    #[test]
    fn test_event_level_parse() {
        assert_eq!(EventLevel::parse("warn"), Some(EventLevel::Warn));
        assert_eq!(EventLevel::parse("trace"), None);
    }
}
