//! Work dispatch adapters.

pub mod convert;
pub mod local;

pub use convert::{default_converters, VariableConverter};
pub use local::{LocalAction, LocalWorkDispatcher, LocalWorkStats};
