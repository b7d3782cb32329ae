//! Builders wiring scheduler components from configuration.

pub mod overseer_builder;

pub use overseer_builder::{Overseer, OverseerBuilder};
