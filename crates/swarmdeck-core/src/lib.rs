//! Swarmdeck Core - domain records and row mapping
//!
//! This crate provides the internal domain records shared between the
//! daemon (swarmdeckd) and the wire protocol crate, plus the pure row
//! mappers that translate raw persisted rows into those records.
//!
//! The mappers are total functions: every raw row maps to a record, with
//! malformed embedded data degrading to defaults instead of errors. This
//! keeps the store layer free of per-row error handling and makes each
//! mapper trivially unit-testable against literal fixtures.
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`

pub mod error;
pub mod event;
pub mod mail;
pub mod merge;
pub mod metrics;
pub mod project;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use event::{map_event, EventLevel, EventRecord, RawEventRow};
pub use mail::{map_message, MailRecord, MessageKind, MessagePriority, RawMailRow};
pub use merge::{map_merge_entry, MergeQueueRecord, MergeStatus, MergeTier, RawMergeRow};
pub use metrics::{map_metrics_session, MetricsSessionRecord, RawMetricsRow};
pub use project::DiscoveredProject;
pub use session::{map_session, AgentState, RawSessionRow, SessionRecord};
