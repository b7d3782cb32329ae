//! Ordering of definitions into the active pool and user actions.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::active::ActiveTaskPool;
use super::calendar::is_scheduled;
use super::sequence::SequenceGenerator;
use super::task::ActiveTask;
use crate::core::definition::{DefinitionProvider, OrderType, TaskDefinition, TaskSelector};
use crate::core::journal::JournalEvent;
use crate::core::resources::build_expr;
use crate::core::PoolError;
use crate::util::{now_local, Odate, TaskOrderId};

/// User recorded for tasks ordered by the daily procedure.
pub const SYSTEM_USER: &str = "SYSTEM";

/// Checks run before a definition is ordered.
#[derive(Debug, Clone, Copy)]
pub struct TaskOrderContext<'a> {
    /// Date the task is ordered for.
    pub odate: &'a Odate,
    /// Current order date of the pool.
    pub current: &'a Odate,
    /// Skip every check.
    pub force: bool,
    /// Accept order dates before the current one.
    pub allow_past: bool,
}

impl TaskOrderContext<'_> {
    /// Reasons the definition cannot be ordered; empty if it can.
    pub fn check(&self, definition: &TaskDefinition) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.force {
            return reasons;
        }
        if !is_scheduled(&definition.schedule, self.odate) {
            reasons.push("Scheduling criteria does not meet".to_string());
        }
        if !self.allow_past && self.odate.is_before(self.current) {
            reasons.push("Task cannot be ordered before current day".to_string());
        }
        reasons
    }
}

/// Resolves definitions, instantiates pool entries and applies user actions.
pub struct TaskPoolManager {
    pool: Arc<ActiveTaskPool>,
    definitions: Arc<dyn DefinitionProvider>,
    sequence: Arc<SequenceGenerator>,
}

impl TaskPoolManager {
    /// Create a manager.
    pub fn new(
        pool: Arc<ActiveTaskPool>,
        definitions: Arc<dyn DefinitionProvider>,
        sequence: Arc<SequenceGenerator>,
    ) -> Self {
        Self {
            pool,
            definitions,
            sequence,
        }
    }

    /// Pool the manager orders into.
    pub fn pool(&self) -> &Arc<ActiveTaskPool> {
        &self.pool
    }

    fn definition(&self, selector: &TaskSelector) -> Result<Arc<TaskDefinition>, PoolError> {
        self.definitions
            .get_tasks(std::slice::from_ref(selector))?
            .into_iter()
            .next()
            .ok_or_else(|| PoolError::Definition(format!("task {}/{} not found", selector.group, selector.name)))
    }

    fn submit(
        &self,
        definition: Arc<TaskDefinition>,
        ctx: &TaskOrderContext<'_>,
        event: JournalEvent,
    ) -> Result<TaskOrderId, PoolError> {
        let reasons = ctx.check(&definition);
        if !reasons.is_empty() {
            return Err(PoolError::NotSubmitted(reasons.join(",")));
        }
        let order_id = self.sequence.next(ctx.current);
        let task = ActiveTask::new(order_id.clone(), ctx.odate.clone(), definition, &now_local());
        let task = self.pool.add(task)?;
        info!(
            order_id = %order_id,
            group = %task.definition().group,
            name = %task.definition().name,
            odate = %ctx.odate,
            "task ordered"
        );
        self.pool.journal(&task, event);
        Ok(order_id)
    }

    /// Order one definition. The pool's current odate is used when `odate`
    /// is `None`.
    pub fn order(&self, selector: &TaskSelector, odate: Option<Odate>, user: &str) -> Result<TaskOrderId, PoolError> {
        let current = self.pool.current_odate();
        let odate = odate.unwrap_or_else(|| current.clone());
        let ctx = TaskOrderContext {
            odate: &odate,
            current: &current,
            force: false,
            allow_past: false,
        };
        let event = JournalEvent::Ordered {
            user: user.into(),
            odate: odate.to_string(),
        };
        self.submit(self.definition(selector)?, &ctx, event)
    }

    /// Order one definition skipping the calendar and submission checks.
    pub fn force(&self, selector: &TaskSelector, odate: Option<Odate>, user: &str) -> Result<TaskOrderId, PoolError> {
        let current = self.pool.current_odate();
        let odate = odate.unwrap_or_else(|| current.clone());
        let ctx = TaskOrderContext {
            odate: &odate,
            current: &current,
            force: true,
            allow_past: true,
        };
        let event = JournalEvent::Forced {
            user: user.into(),
            odate: odate.to_string(),
        };
        self.submit(self.definition(selector)?, &ctx, event)
    }

    fn definitions_in(&self, group_pattern: &str) -> Result<Vec<Arc<TaskDefinition>>, PoolError> {
        let expr = build_expr(group_pattern).map_err(|e| PoolError::Validation(e.to_string()))?;
        let mut selectors = Vec::new();
        for group in self.definitions.get_groups().into_iter().filter(|g| expr.is_match(g)) {
            selectors.extend(
                self.definitions
                    .get_task_model_list(&group)?
                    .into_iter()
                    .map(|m| TaskSelector::new(m.group, m.name)),
            );
        }
        if selectors.is_empty() {
            return Ok(Vec::new());
        }
        self.definitions.get_tasks(&selectors)
    }

    /// Order every definition in the groups matching a wildcard. Definitions
    /// rejected by the ordering checks are skipped.
    pub fn order_group(
        &self,
        group_pattern: &str,
        odate: Option<Odate>,
        user: &str,
    ) -> Result<Vec<TaskOrderId>, PoolError> {
        let current = self.pool.current_odate();
        let odate = odate.unwrap_or_else(|| current.clone());
        let ctx = TaskOrderContext {
            odate: &odate,
            current: &current,
            force: false,
            allow_past: false,
        };
        let mut ordered = Vec::new();
        for def in self.definitions_in(group_pattern)? {
            let event = JournalEvent::Ordered {
                user: user.into(),
                odate: odate.to_string(),
            };
            let name = def.name.clone();
            match self.submit(def, &ctx, event) {
                Ok(id) => ordered.push(id),
                Err(PoolError::NotSubmitted(reason)) => debug!(task = %name, reason = %reason, "not ordered"),
                Err(e) => return Err(e),
            }
        }
        Ok(ordered)
    }

    /// Order every scheduled, non-manual definition for the pool's current
    /// odate. Returns the number ordered.
    pub fn order_new_tasks(&self) -> usize {
        let odate = self.pool.current_odate();
        let ctx = TaskOrderContext {
            odate: &odate,
            current: &odate,
            force: false,
            allow_past: false,
        };
        let definitions = match self.definitions_in("*") {
            Ok(defs) => defs,
            Err(e) => {
                warn!(error = %e, "unable to load definitions for the new day");
                return 0;
            }
        };
        let mut ordered = 0;
        for def in definitions {
            if def.schedule.order_type == OrderType::Manual {
                continue;
            }
            let event = JournalEvent::Ordered {
                user: SYSTEM_USER.into(),
                odate: odate.to_string(),
            };
            let name = def.name.clone();
            match self.submit(def, &ctx, event) {
                Ok(_) => ordered += 1,
                Err(PoolError::NotSubmitted(reason)) => debug!(task = %name, reason = %reason, "not scheduled today"),
                Err(e) => warn!(task = %name, error = %e, "unable to order task"),
            }
        }
        info!(ordered, odate = %odate, "new tasks ordered");
        ordered
    }

    fn validated(id: &TaskOrderId) -> Result<&TaskOrderId, PoolError> {
        id.validate().map_err(PoolError::Validation)?;
        Ok(id)
    }

    /// Skip the time window and tickets for the next cycle.
    pub fn enforce(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.enforce(Self::validated(id)?, user)?;
        Ok(format!("Task {id} enforced"))
    }

    /// Rerun an ended task.
    pub fn rerun(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.rerun(Self::validated(id)?, user)?;
        Ok(format!("Task {id} rerun"))
    }

    /// Hold a task.
    pub fn hold(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.hold(Self::validated(id)?, user)?;
        Ok(format!("Task {id} held"))
    }

    /// Free a held task.
    pub fn free(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.free(Self::validated(id)?, user)?;
        Ok(format!("Task {id} freed"))
    }

    /// Mark a failed task as ended OK.
    pub fn set_ok(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.set_ok(Self::validated(id)?, user)?;
        Ok(format!("Task {id} set to ended OK"))
    }

    /// Confirm a task waiting for confirmation.
    pub fn confirm(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.confirm(Self::validated(id)?, user)?;
        Ok(format!("Task {id} confirmed"))
    }

    /// Cancel a running task.
    pub fn cancel(&self, id: &TaskOrderId, user: &str) -> Result<String, PoolError> {
        self.pool.cancel(Self::validated(id)?, user)?;
        Ok(format!("Task {id} cancellation requested"))
    }
}
