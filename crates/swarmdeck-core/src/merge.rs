//! Merge-queue records.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// ============================================================================
// Status Enums
// ============================================================================

/// Status of a pending integration unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Pending,
    Merging,
    Merged,
    Conflict,
    Failed,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Merging => "merging",
            Self::Merged => "merged",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "merging" => Some(Self::Merging),
            "merged" => Some(Self::Merged),
            "conflict" => Some(Self::Conflict),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolution tier a merge was settled at.
///
/// Written by the merger once an entry leaves `pending`; null until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeTier {
    CleanMerge,
    AutoResolve,
    AiResolve,
    Reimagine,
}

impl MergeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CleanMerge => "clean-merge",
            Self::AutoResolve => "auto-resolve",
            Self::AiResolve => "ai-resolve",
            Self::Reimagine => "reimagine",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean-merge" => Some(Self::CleanMerge),
            "auto-resolve" => Some(Self::AutoResolve),
            "ai-resolve" => Some(Self::AiResolve),
            "reimagine" => Some(Self::Reimagine),
            _ => None,
        }
    }
}

// ============================================================================
// Raw Row / Domain Record
// ============================================================================

/// One row of the `merge_queue` table, exactly as persisted.
///
/// `files_modified` is a JSON-encoded array of paths stored as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMergeRow {
    pub id: i64,
    pub branch_name: String,
    pub bead_id: String,
    pub agent_name: String,
    pub files_modified: String,
    pub queued_at: String,
    pub status: String,
    pub merge_tier: Option<String>,
}

/// One pending integration unit. Mutated in place as its status advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeQueueRecord {
    pub id: i64,
    pub branch_name: String,
    pub bead_id: String,
    pub agent_name: String,
    /// Paths touched on the branch; empty when the stored encoding was bad
    pub files_modified: Vec<String>,
    pub queued_at: String,
    /// Status as stored (see [`MergeStatus`])
    pub status: String,
    /// Resolution tier as stored, if resolved (see [`MergeTier`])
    pub merge_tier: Option<String>,
}

/// Maps a raw merge-queue row into the domain record.
///
/// The embedded file list degrades to empty on any decode failure; this
/// function never returns an error.
pub fn map_merge_entry(row: RawMergeRow) -> MergeQueueRecord {
    let files_modified = decode_file_list(&row.files_modified);
    MergeQueueRecord {
        id: row.id,
        branch_name: row.branch_name,
        bead_id: row.bead_id,
        agent_name: row.agent_name,
        files_modified,
        queued_at: row.queued_at,
        status: row.status,
        merge_tier: row.merge_tier,
    }
}

/// Decodes the stored JSON file list, degrading to empty on failure.
fn decode_file_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(files) => files,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed files_modified column");
            Vec::new()
        }
    }
}
