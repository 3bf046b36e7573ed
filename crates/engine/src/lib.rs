//! Reconciliation engine for upsync
//!
//! This crate turns client batches into committed state:
//! - EntitySchema: typed column setters per entity
//! - MutationHooks: per-entity veto points and batch-completion callbacks
//! - EntityRegistry: the immutable entity-name to handler map built at startup
//! - BatchPlan: partitioning, create de-duplication and timestamp ordering
//! - ReconciliationEngine: per-record apply, single commit, conflict retry
//! - EngineConfig: `upsync.toml` settings
//!
//! The engine knows nothing about concrete storage; it drives any
//! [`upsync_core::Storage`] through its unit-of-work interface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod handler;
pub mod hooks;
pub mod plan;
pub mod registry;
pub mod schema;

pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use engine::ReconciliationEngine;
pub use handler::EntityHandler;
pub use hooks::{AllowAll, HookContext, HookOutcome, MutationHooks};
pub use plan::{BatchPlan, Partition};
pub use registry::{EntityRegistry, EntityRegistryBuilder};
pub use schema::EntitySchema;
