//! Unit tests for individual components

mod error_test;
mod config_test;
mod util_test;
mod resources_test;
mod events_test;
mod journal_test;
mod definitions_test;
mod builders_test;
mod runtime_test;
