//! Lifecycle controller for the CSM management agent.
//!
//! The agent runs as a single background daemon per host: an advisory
//! marker file keeps a second instance from starting, a re-exec transition
//! moves the process off its controlling session, and an orchestrator
//! brings dependent services up in a strict order and down in the exact
//! reverse. Alerts are produced by a product-specific plugin resolved by
//! name at startup, persisted through a key-value store, and relayed to
//! connected API clients.
//!
//! The crate splits along those seams:
//!
//! - [`agent`] — instance guard, background transition, alert relay, and
//!   the init/run orchestration that owns every other subsystem.
//! - [`alerts`] — the alert model, its persistence, the query service, and
//!   the monitor thread polling the plugin.
//! - [`plugins`] — the alert-source capability and the per-product factory
//!   registry behind it.
//! - [`api`] — the JSON-lines TCP surface clients talk to.
//! - [`storage`], [`logger`], [`core`] — the key-value seam, the JSON-lines
//!   log sink, and shared configuration/error types.

pub mod agent;
pub mod alerts;
pub mod api;
#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod logger;
pub mod plugins;
pub mod storage;
