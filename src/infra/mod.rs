//! Infrastructure adapters: persistent collections, definition sources and
//! work dispatch.

pub mod collection;
pub mod definitions;
pub mod work;

pub use collection::{FileCollection, FileCollectionProvider, InMemoryCollection, InMemoryCollectionProvider};
pub use definitions::InMemoryDefinitionProvider;
pub use work::{default_converters, LocalWorkDispatcher, VariableConverter};
