//! Task definitions and the provider contract.
//!
//! Definitions are immutable templates keyed by `(group, name)`. The active
//! pool instantiates them into entries; loading and parsing them from storage
//! is left to [`DefinitionProvider`] implementations.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::events::TicketAction;
use crate::core::resources::{validate_name, FlagPolicy};
use crate::core::PoolError;
use crate::util::{HourMinTime, Odate, OdateValue};

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// No-op task, always ends OK.
    Dummy,
    /// Operating system command.
    Os,
    /// Cloud function or state machine.
    Aws,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dummy => f.write_str("dummy"),
            Self::Os => f.write_str("os"),
            Self::Aws => f.write_str("aws"),
        }
    }
}

/// Calendar rule deciding on which order dates a task is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Only ordered by hand.
    Manual,
    /// Every day of the allowed months.
    Daily,
    /// Listed ISO weekdays (1 = Monday).
    Weekday,
    /// Listed days of the month.
    #[serde(rename = "dayofmonth")]
    DayOfMonth,
    /// Listed exact dates.
    Exact,
    /// Listed days counted back from the end of the month (1 = last day).
    #[serde(rename = "fromend")]
    FromEnd,
}

/// Schedule of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingData {
    /// Calendar rule.
    pub order_type: OrderType,
    /// Start of the execution window.
    #[serde(default)]
    pub from: Option<HourMinTime>,
    /// End of the execution window.
    #[serde(default)]
    pub to: Option<HourMinTime>,
    /// Allowed months (1..=12); empty allows all.
    #[serde(default)]
    pub months: Vec<u32>,
    /// Weekdays, days of month or days from end, depending on the order type.
    #[serde(default)]
    pub values: Vec<u32>,
    /// Exact dates as `YYYY-MM-DD`.
    #[serde(default)]
    pub exact_dates: Vec<String>,
}

impl SchedulingData {
    /// Schedule that only allows manual ordering.
    pub fn manual() -> Self {
        Self {
            order_type: OrderType::Manual,
            from: None,
            to: None,
            months: Vec::new(),
            values: Vec::new(),
            exact_dates: Vec::new(),
        }
    }

    /// Schedule ordering every day.
    pub fn daily() -> Self {
        Self {
            order_type: OrderType::Daily,
            ..Self::manual()
        }
    }

    /// True if the month is allowed.
    pub fn month_allowed(&self, month: u32) -> bool {
        self.months.is_empty() || self.months.contains(&month)
    }
}

/// Reference point for the next run of a cyclic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunFrom {
    /// Interval counted from the start of the previous run.
    Start,
    /// Interval counted from the end of the previous run.
    #[default]
    End,
    /// Interval counted from the scheduled time of the previous run.
    Schedule,
}

/// Cyclic execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CyclicData {
    /// Task runs repeatedly within its order date.
    pub is_cyclic: bool,
    /// Maximum number of runs.
    pub max_runs: u32,
    /// Reference point for the interval.
    #[serde(default)]
    pub run_from: RunFrom,
    /// Minutes between runs.
    pub interval_minutes: u32,
}

/// How in-tickets combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TicketRelation {
    /// All tickets required.
    #[default]
    #[serde(rename = "AND")]
    And,
    /// Any ticket suffices.
    #[serde(rename = "OR")]
    Or,
}

/// Ticket a task waits for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTicket {
    /// Ticket name.
    pub name: String,
    /// Expected odate relative to the task odate.
    pub odate: OdateValue,
}

/// Flag a task holds while executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagData {
    /// Flag name.
    pub name: String,
    /// Holding policy.
    pub policy: FlagPolicy,
}

/// Ticket added or removed after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutTicket {
    /// Ticket name.
    pub name: String,
    /// Odate relative to the task odate.
    pub odate: OdateValue,
    /// Add or remove.
    pub action: TicketAction,
}

/// Environment variable passed to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name, conventionally `%%NAME`.
    pub name: String,
    /// Value.
    pub value: String,
}

impl Variable {
    /// Build a variable.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Immutable task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task name.
    pub name: String,
    /// Group name.
    pub group: String,
    /// Free form description.
    #[serde(default)]
    pub description: String,
    /// Work kind.
    pub task_type: TaskType,
    /// Requires manual confirmation before it runs.
    #[serde(default)]
    pub confirm: bool,
    /// Days a terminal entry stays in the pool; the pool default is used when absent.
    #[serde(default)]
    pub retention_days: Option<u32>,
    /// Calendar and time window.
    pub schedule: SchedulingData,
    /// Cyclic execution.
    #[serde(default)]
    pub cyclic: CyclicData,
    /// In-ticket relation.
    #[serde(default)]
    pub relation: TicketRelation,
    /// Preconditions.
    #[serde(default)]
    pub in_tickets: Vec<InTicket>,
    /// Flags held during execution.
    #[serde(default)]
    pub flags: Vec<FlagData>,
    /// Post-processing ticket actions.
    #[serde(default)]
    pub out_tickets: Vec<OutTicket>,
    /// Extra worker variables.
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// Opaque action payload handed to the converter.
    #[serde(default)]
    pub action: Value,
}

impl TaskDefinition {
    /// Minimal dummy definition with a manual schedule.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            description: String::new(),
            task_type: TaskType::Dummy,
            confirm: false,
            retention_days: None,
            schedule: SchedulingData::manual(),
            cyclic: CyclicData::default(),
            relation: TicketRelation::And,
            in_tickets: Vec::new(),
            flags: Vec::new(),
            out_tickets: Vec::new(),
            variables: Vec::new(),
            action: Value::Null,
        }
    }

    /// Check names and schedule values.
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name).map_err(|e| e.to_string())?;
        validate_name(&self.group).map_err(|e| e.to_string())?;
        for t in &self.in_tickets {
            validate_name(&t.name).map_err(|e| e.to_string())?;
        }
        for t in &self.out_tickets {
            validate_name(&t.name).map_err(|e| e.to_string())?;
        }
        for f in &self.flags {
            validate_name(&f.name).map_err(|e| e.to_string())?;
        }
        if self.schedule.months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(format!("{}: months must be within 1..=12", self.name));
        }
        let range = match self.schedule.order_type {
            OrderType::Weekday => Some(1..=7),
            OrderType::DayOfMonth | OrderType::FromEnd => Some(1..=31),
            _ => None,
        };
        if let Some(range) = range {
            if self.schedule.values.is_empty() {
                return Err(format!("{}: schedule values are required", self.name));
            }
            if self.schedule.values.iter().any(|v| !range.contains(v)) {
                return Err(format!("{}: schedule value out of range", self.name));
            }
        }
        if self.schedule.order_type == OrderType::Exact {
            if self.schedule.exact_dates.is_empty() {
                return Err(format!("{}: exact dates are required", self.name));
            }
            for d in &self.schedule.exact_dates {
                Odate::from_date_string(d).map_err(|e| format!("{}: {e}", self.name))?;
            }
        }
        if self.cyclic.is_cyclic && (self.cyclic.max_runs == 0 || self.cyclic.interval_minutes == 0) {
            return Err(format!("{}: cyclic task needs max runs and interval", self.name));
        }
        Ok(())
    }
}

/// Selects definitions by group and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskSelector {
    /// Group name.
    pub group: String,
    /// Task name.
    pub name: String,
}

impl TaskSelector {
    /// Build a selector.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

/// Summary of a definition for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskModel {
    /// Group name.
    pub group: String,
    /// Task name.
    pub name: String,
    /// Description.
    pub description: String,
}

/// Source of task definitions.
pub trait DefinitionProvider: Send + Sync {
    /// Resolve selectors into definitions. Fails if any selector is unknown.
    fn get_tasks(&self, selectors: &[TaskSelector]) -> Result<Vec<Arc<TaskDefinition>>, PoolError>;
    /// All group names.
    fn get_groups(&self) -> Vec<String>;
    /// Definitions in groups matching a wildcard expression.
    fn get_task_model_list(&self, group_selector: &str) -> Result<Vec<TaskModel>, PoolError>;
}
