//! Shared utilities: dates, identifiers, clock and tracing setup.

pub mod clock;
pub mod hmtime;
pub mod odate;
pub mod telemetry;
pub mod unique;

pub use clock::*;
pub use hmtime::HourMinTime;
pub use odate::{Odate, OdateValue};
pub use telemetry::*;
pub use unique::{ExecutionId, MsgId, TaskOrderId};
