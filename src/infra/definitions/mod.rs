//! Definition providers.

pub mod memory;

pub use memory::InMemoryDefinitionProvider;
