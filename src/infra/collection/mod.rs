//! Persistent collection backends.

pub mod file;
pub mod memory;

pub use file::{FileCollection, FileCollectionProvider};
pub use memory::{InMemoryCollection, InMemoryCollectionProvider};
