//! Active task pool, its persistence and the ordering manager.

mod active;
mod calendar;
mod manager;
mod sequence;
mod store;
mod task;

pub use active::{ActiveTaskPool, PoolMode, TaskDetail, TaskInfo};
pub use calendar::{calc_real_odate, ended_ok, is_scheduled, last_day_of_month, prepare_variables};
pub use manager::{TaskOrderContext, TaskPoolManager, SYSTEM_USER};
pub use sequence::{SequenceGenerator, SEQ_MAX};
pub use store::{ActiveTaskModel, TaskStore};
pub use task::{ActiveTask, TaskExecution, TaskRuntime, TaskState};
