//! Daily roll-over procedure.
//!
//! Once per calendar day, on the first tick at or after the configured
//! trigger time, the pool moves to the new order date, terminal entries past
//! retention are purged and every definition scheduled for the day is
//! ordered. Cleanup and re-seeding are not atomic with respect to concurrent
//! user actions.

use std::sync::Arc;

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use tracing::info;

use crate::core::events::{DispatchedMessage, EventMessage, EventParticipant, EventResponse, RouteName};
use crate::core::pool::TaskPoolManager;
use crate::core::DispatchError;
use crate::util::{HourMinTime, Odate};

/// Runs the daily procedure.
pub struct DailyExecutor {
    manager: Arc<TaskPoolManager>,
    new_day_proc: HourMinTime,
    last_executed: RwLock<Odate>,
}

impl DailyExecutor {
    /// Create an executor. `last_executed` is normally today.
    pub fn new(manager: Arc<TaskPoolManager>, new_day_proc: HourMinTime, last_executed: Odate) -> Self {
        Self {
            manager,
            new_day_proc,
            last_executed: RwLock::new(last_executed),
        }
    }

    /// Date the procedure last ran for.
    pub fn last_executed(&self) -> Odate {
        self.last_executed.read().clone()
    }

    /// True if the trigger time has passed today and the procedure has not
    /// run for today yet.
    pub fn check_daily_procedure(&self, now: &NaiveDateTime) -> bool {
        let today = Odate::from_date(now.date());
        self.new_day_proc.on(now.date()) <= *now && self.last_executed.read().is_before(&today)
    }

    /// Run the procedure for `today`. Returns the number of entries deleted
    /// and the number ordered.
    pub fn daily_procedure(&self, today: Odate) -> (usize, usize) {
        *self.last_executed.write() = today.clone();
        self.run(today)
    }

    fn run(&self, today: Odate) -> (usize, usize) {
        let pool = self.manager.pool();
        pool.set_current_odate(today.clone());
        let deleted = pool.cleanup(&today);
        let ordered = self.manager.order_new_tasks();
        info!(odate = %today, deleted, ordered, "daily procedure finished");
        (deleted, ordered)
    }

    /// Timer entry point. Returns the procedure counts when it ran.
    pub fn process_time_event(&self, now: &NaiveDateTime) -> Option<(usize, usize)> {
        if !self.check_daily_procedure(now) {
            return None;
        }
        let today = Odate::from_date(now.date());
        {
            // Two ticks may pass the check concurrently; only one claims the day.
            let mut last = self.last_executed.write();
            if !last.is_before(&today) {
                return None;
            }
            *last = today.clone();
        }
        Some(self.run(today))
    }
}

impl EventParticipant for DailyExecutor {
    fn process(&self, route: RouteName, msg: &DispatchedMessage) -> Result<EventResponse, DispatchError> {
        match (route, &msg.message) {
            (RouteName::Tick, EventMessage::Tick(tick)) => {
                self.process_time_event(&tick.time);
                Ok(EventResponse::Ack)
            }
            (RouteName::Tick, _) => Err(DispatchError::UnrecognizedMessageFormat),
            (other, _) => Err(DispatchError::InvalidRouteName(other)),
        }
    }
}
