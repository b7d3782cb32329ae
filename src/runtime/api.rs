//! Service-facing response models and thin operation wrappers.
//!
//! Transports map these onto their own wire formats; every error is turned
//! into an unsuccessful [`ActionResponse`] carrying the error text.

use serde::{Deserialize, Serialize};

use crate::core::definition::TaskSelector;
use crate::core::pool::{ActiveTaskPool, PoolMode, TaskInfo, TaskPoolManager};
use crate::core::resources::{FlagPolicy, FlagResource, ResourceManager, TicketResource};
use crate::core::PoolError;
use crate::util::{Odate, TaskOrderId};

/// Outcome of an ordering, task or resource action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// True if the action was applied.
    pub success: bool,
    /// Result or error text.
    pub message: String,
    /// Order ids created by the action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_ids: Vec<TaskOrderId>,
}

impl ActionResponse {
    /// Successful response.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            order_ids: Vec::new(),
        }
    }

    /// Failed response.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            order_ids: Vec::new(),
        }
    }

    fn ordered(ids: Vec<TaskOrderId>) -> Self {
        Self {
            success: true,
            message: format!("{} task(s) ordered", ids.len()),
            order_ids: ids,
        }
    }
}

impl<E: std::fmt::Display> From<Result<String, E>> for ActionResponse {
    fn from(value: Result<String, E>) -> Self {
        match value {
            Ok(message) => Self::ok(message),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Snapshot of the pool for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskListResponse {
    /// Current order date.
    pub odate: Odate,
    /// Processing mode.
    pub mode: PoolMode,
    /// Matching tasks sorted by order id.
    pub tasks: Vec<TaskInfo>,
}

/// User actions addressing an existing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskActionKind {
    /// Hold.
    Hold,
    /// Free.
    Free,
    /// Rerun.
    Rerun,
    /// Set OK.
    SetOk,
    /// Confirm.
    Confirm,
    /// Enforce.
    Enforce,
    /// Cancel.
    Cancel,
}

fn parse_odate(odate: Option<&str>) -> Result<Option<Odate>, PoolError> {
    odate
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Odate>().map_err(|e| PoolError::Validation(e.to_string())))
        .transpose()
}

/// Order (or force) a single definition.
pub fn order_task(
    manager: &TaskPoolManager,
    group: &str,
    name: &str,
    odate: Option<&str>,
    force: bool,
    user: &str,
) -> ActionResponse {
    let selector = TaskSelector::new(group, name);
    let result = parse_odate(odate).and_then(|odate| {
        if force {
            manager.force(&selector, odate, user)
        } else {
            manager.order(&selector, odate, user)
        }
    });
    match result {
        Ok(id) => ActionResponse::ordered(vec![id]),
        Err(e) => ActionResponse::failed(e.to_string()),
    }
}

/// Order every definition of the groups matching a wildcard.
pub fn order_group(manager: &TaskPoolManager, group: &str, odate: Option<&str>, user: &str) -> ActionResponse {
    match parse_odate(odate).and_then(|odate| manager.order_group(group, odate, user)) {
        Ok(ids) => ActionResponse::ordered(ids),
        Err(e) => ActionResponse::failed(e.to_string()),
    }
}

/// Apply a user action to a task.
pub fn task_action(manager: &TaskPoolManager, action: TaskActionKind, order_id: &str, user: &str) -> ActionResponse {
    let id = TaskOrderId::from(order_id);
    let result = match action {
        TaskActionKind::Hold => manager.hold(&id, user),
        TaskActionKind::Free => manager.free(&id, user),
        TaskActionKind::Rerun => manager.rerun(&id, user),
        TaskActionKind::SetOk => manager.set_ok(&id, user),
        TaskActionKind::Confirm => manager.confirm(&id, user),
        TaskActionKind::Enforce => manager.enforce(&id, user),
        TaskActionKind::Cancel => manager.cancel(&id, user),
    };
    result.into()
}

/// List tasks whose name matches a wildcard.
pub fn list_tasks(pool: &ActiveTaskPool, filter: &str) -> Result<TaskListResponse, PoolError> {
    Ok(TaskListResponse {
        odate: pool.current_odate(),
        mode: pool.mode(),
        tasks: pool.list(filter)?,
    })
}

/// Add a ticket.
pub fn add_ticket(resources: &ResourceManager, name: &str, odate: &str) -> ActionResponse {
    resources
        .add_ticket(name, odate)
        .map(|()| format!("ticket {name} {odate} added"))
        .into()
}

/// Delete a ticket.
pub fn delete_ticket(resources: &ResourceManager, name: &str, odate: &str) -> ActionResponse {
    resources
        .delete_ticket(name, odate)
        .map(|()| format!("ticket {name} {odate} deleted"))
        .into()
}

/// Set a flag.
pub fn set_flag(resources: &ResourceManager, name: &str, policy: FlagPolicy) -> ActionResponse {
    resources.set_flag(name, policy).map(|()| format!("flag {name} set")).into()
}

/// Unset a flag.
pub fn unset_flag(resources: &ResourceManager, name: &str) -> ActionResponse {
    resources.unset_flag(name).map(|()| format!("flag {name} unset")).into()
}

/// Tickets matching name and odate prefixes.
pub fn list_tickets(resources: &ResourceManager, name: &str, odate: &str) -> Vec<TicketResource> {
    resources.list_tickets(name, odate)
}

/// Flags matching a name prefix.
pub fn list_flags(resources: &ResourceManager, name: &str) -> Vec<FlagResource> {
    resources.list_flags(name)
}
