//! Swarmdeck Daemon - state-synchronization pipeline and WebSocket gateway
//!
//! This crate provides the core infrastructure for the swarmdeck daemon:
//! - `discovery` - periodic scan for swarm state roots on disk
//! - `store` - read-only SQLite bundle for one live project
//! - `demo` - scripted synthetic source used when nothing live is running
//! - `source` - single owner of the active provider and the switch policy
//! - `delta` - per-connection change tracking
//! - `server` - WebSocket gateway and the poll/broadcast tick
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       swarmdeckd daemon                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌───────────────┐  projects   ┌───────────────────────────┐ │
//! │  │ DiscoveryService│──────────▶│       SourceManager       │ │
//! │  │ (root scanner)  │           │  Live(stores) | Demo(gen) │ │
//! │  └───────────────┘             └────────────┬──────────────┘ │
//! │                                             │ poll tick      │
//! │  ┌───────────────┐   deltas    ┌────────────▼──────────────┐ │
//! │  │  WS clients   │◀────────────│      DashboardServer      │ │
//! │  │  (renderers)  │             │ (connections + trackers)  │ │
//! │  └───────────────┘             └───────────────────────────┘ │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Store and connection failures degrade, they never take the daemon down

pub mod config;
pub mod delta;
pub mod demo;
pub mod discovery;
pub mod server;
pub mod source;
pub mod store;
