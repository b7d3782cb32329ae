//! # Overseer
//!
//! A workload scheduler that keeps an in-memory pool of active task
//! instances, gates them on date-scoped tickets and reference counted flags,
//! hands eligible work to an external worker layer and re-seeds the pool once
//! a day.
//!
//! ## Components
//!
//! - **Resource Manager**: tickets (name + odate existence conditions) and
//!   flags (shared or exclusive markers), each in its own write-behind store.
//! - **Event Dispatcher**: typed pub/sub with request/response routes used
//!   for ticket checks, flag acquisition and journaling.
//! - **Active Task Pool**: the per-entry state machine
//!   `Waiting → Eligible → Starting → Executing → Ended | Failed` with the
//!   `Held` and `Confirmed` modifiers.
//! - **Task Pool Manager**: orders definitions into the pool and applies user
//!   actions (hold, free, rerun, set OK, confirm, enforce, cancel).
//! - **Daily Executor**: purges expired entries and orders the definitions
//!   scheduled for the new order date.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use overseer::builders::OverseerBuilder;
//! use overseer::config::OverseerConfig;
//! use overseer::core::definition::TaskSelector;
//! use overseer::infra::InMemoryDefinitionProvider;
//!
//! let definitions = Arc::new(InMemoryDefinitionProvider::load_dir("definitions")?);
//! let overseer = OverseerBuilder::new(OverseerConfig::from_file("overseer.json")?)
//!     .with_definitions(definitions)
//!     .build()?;
//! overseer.start();
//!
//! let id = overseer.manager().order(&TaskSelector::new("BATCH", "LOAD"), None, "admin")?;
//! overseer.resources().add_ticket("LOAD_READY", "20200909")?;
//!
//! overseer.shutdown().await;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders wiring scheduler components from configuration.
pub mod builders;
/// Configuration models for the pool, resource stores, journal and storage.
pub mod config;
/// Core scheduling components.
pub mod core;
/// Infrastructure adapters for collections, definitions and work dispatch.
pub mod infra;
/// Tokio runtime adapters, the ticker and the service-facing API.
pub mod runtime;
/// Shared utilities.
pub mod util;
