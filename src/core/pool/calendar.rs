//! Calendar matching and order date arithmetic.
//!
//! [`is_scheduled`] decides whether a definition runs on an order date.
//! [`calc_real_odate`] resolves the odate of a ticket declared relative to
//! the task's order date; `PREV` and `NEXT` follow the task's schedule rather
//! than plain day arithmetic.

use chrono::{Datelike, NaiveDate};

use crate::core::definition::{OrderType, SchedulingData, TaskDefinition, TaskType, Variable};
use crate::util::{Odate, OdateValue, TaskOrderId};

// Upper bound on calendar walks for schedules that never match.
const MAX_STEPS: usize = 800;

/// Last day of a month.
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

fn ymd(year: i32, month: u32, day: u32) -> Option<Odate> {
    NaiveDate::from_ymd_opt(year, month, day).map(Odate::from_date)
}

/// True if the definition's calendar schedules it on `odate`.
pub fn is_scheduled(schedule: &SchedulingData, odate: &Odate) -> bool {
    let month_ok = schedule.month_allowed(odate.month());
    match schedule.order_type {
        OrderType::Manual => true,
        OrderType::Daily => month_ok,
        OrderType::Weekday => month_ok && schedule.values.contains(&odate.weekday()),
        OrderType::DayOfMonth => month_ok && schedule.values.contains(&odate.day()),
        OrderType::FromEnd => {
            let (y, m, d) = odate.ymd();
            let last = last_day_of_month(y, m);
            month_ok && schedule.values.iter().any(|&n| n >= 1 && last + 1 >= n && d == last + 1 - n)
        }
        OrderType::Exact => schedule.exact_dates.iter().any(|d| *d == odate.format_date()),
    }
}

/// Resolve a ticket odate. Returns `None` for date independent tickets.
pub fn calc_real_odate(current: &Odate, expect: OdateValue, schedule: &SchedulingData) -> Option<Odate> {
    let step: i64 = match expect {
        OdateValue::Any | OdateValue::None => return None,
        OdateValue::Date => return Some(current.clone()),
        OdateValue::Relative(days) => return Some(current.add_days(i64::from(days))),
        OdateValue::Next => 1,
        OdateValue::Prev => -1,
    };

    let resolved = match schedule.order_type {
        OrderType::Manual => None,
        OrderType::Daily => daily(current, step, schedule),
        OrderType::Exact => exact(current, step, &schedule.exact_dates),
        OrderType::Weekday => weekday(current, step, schedule),
        OrderType::DayOfMonth => day_of_month(current, step, schedule),
        OrderType::FromEnd => from_end(current, step, schedule),
    };
    Some(resolved.unwrap_or_else(|| current.add_days(step)))
}

fn daily(current: &Odate, step: i64, schedule: &SchedulingData) -> Option<Odate> {
    let mut planned = current.clone();
    for _ in 0..MAX_STEPS {
        planned = planned.add_days(step);
        if schedule.month_allowed(planned.month()) {
            return Some(planned);
        }
    }
    None
}

fn exact(current: &Odate, step: i64, dates: &[String]) -> Option<Odate> {
    let today = current.format_date();
    let idx = dates.iter().position(|d| *d == today)?;
    if dates.len() == 1 {
        return None;
    }
    let next = if step > 0 { idx.checked_add(1)? } else { idx.checked_sub(1)? };
    dates.get(next).and_then(|d| Odate::from_date_string(d).ok())
}

fn start_of_week(date: &Odate, week_shift: i64) -> Odate {
    date.add_days(-i64::from(date.weekday()) + 1 + week_shift * 7)
}

fn weekday(current: &Odate, step: i64, schedule: &SchedulingData) -> Option<Odate> {
    let mut values = schedule.values.clone();
    values.sort_unstable();
    values.dedup();
    let mut idx = values.iter().position(|&v| v == current.weekday())? as i64;
    let len = values.len() as i64;
    let mut refdate = current.clone();

    for _ in 0..MAX_STEPS {
        idx += step;
        let week_shift = if idx < 0 {
            idx = len - 1;
            -1
        } else if idx >= len {
            idx = 0;
            1
        } else {
            0
        };
        let day = i64::from(values[idx as usize]);
        refdate = start_of_week(&refdate, week_shift).add_days(day - 1);
        if schedule.month_allowed(refdate.month()) {
            return Some(refdate);
        }
    }
    None
}

/// Month `step` months away from `date` (or `date`'s own month when
/// `include_current`), skipping months the schedule excludes.
fn next_month_year(schedule: &SchedulingData, date: &Odate, step: i64, include_current: bool) -> (i32, u32) {
    let (mut year, month, _) = date.ymd();
    let mut month = i64::from(month);
    let advance = |month: &mut i64, year: &mut i32| {
        *month += step;
        if *month < 1 {
            *month = 12;
            *year -= 1;
        } else if *month > 12 {
            *month = 1;
            *year += 1;
        }
    };
    if !include_current {
        advance(&mut month, &mut year);
    }
    for _ in 0..12 {
        if schedule.month_allowed(month as u32) {
            break;
        }
        advance(&mut month, &mut year);
    }
    (year, month as u32)
}

fn day_of_month(current: &Odate, step: i64, schedule: &SchedulingData) -> Option<Odate> {
    let mut values = schedule.values.clone();
    values.sort_unstable();
    values.dedup();
    let mut idx = values.iter().position(|&v| v == current.day())? as i64;
    let len = values.len() as i64;
    let mut refdate = current.clone();

    for _ in 0..MAX_STEPS {
        idx += step;
        let other_month = if idx < 0 {
            idx = len - 1;
            true
        } else if idx >= len {
            idx = 0;
            true
        } else {
            false
        };
        let day = values[idx as usize];
        let (year, month) = next_month_year(schedule, &refdate, step, !other_month);
        let last = last_day_of_month(year, month);
        if day <= last {
            return ymd(year, month, day);
        }
        refdate = ymd(year, month, last)?;
    }
    None
}

fn from_end(current: &Odate, step: i64, schedule: &SchedulingData) -> Option<Odate> {
    let shift = *schedule.values.first()?;
    let (year, month) = next_month_year(schedule, current, step, false);
    let last = last_day_of_month(year, month);
    ymd(year, month, last.saturating_sub(shift.saturating_sub(1)).max(1))
}

/// Execution variables for a run.
pub fn prepare_variables(
    definition: &TaskDefinition,
    order_id: &TaskOrderId,
    run_number: u32,
    execution_id: &str,
    odate: &Odate,
) -> Vec<Variable> {
    let mut vars = vec![
        Variable::new("%%ORDERID", order_id.as_str()),
        Variable::new("%%RN", run_number.to_string()),
        Variable::new("%%EXECID", execution_id),
        Variable::new("%%ODATE", odate.odate()),
        Variable::new("%%TASKNAME", definition.name.as_str()),
    ];
    vars.extend(definition.variables.iter().cloned());
    vars
}

/// Outcome of an ended execution.
pub const fn ended_ok(task_type: TaskType, max_rc: i32, rc: i32, sc: i32) -> bool {
    match task_type {
        TaskType::Dummy => true,
        TaskType::Os => rc >= 0 && rc <= max_rc,
        TaskType::Aws => sc == 0,
    }
}
