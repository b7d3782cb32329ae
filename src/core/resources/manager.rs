//! Ticket and flag operations over two independent stores.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{FlagPolicy, FlagResource, FlagState, ResourceStore, TicketResource};
use crate::core::events::{
    CheckedTicket, DispatchedMessage, EventMessage, EventParticipant, EventResponse, FlagRequest, RouteName,
    TicketAction, TicketActionItem,
};
use crate::core::{DispatchError, ResourceError};

/// Longest accepted ticket or flag name.
pub const MAX_RESOURCE_NAME: usize = 32;

/// Names are 1..=32 word characters, dashes or dots.
pub fn validate_name(name: &str) -> Result<(), ResourceError> {
    if name.is_empty() || name.len() > MAX_RESOURCE_NAME {
        return Err(ResourceError::Validation(format!(
            "name must be 1 to {MAX_RESOURCE_NAME} characters: '{name}'"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ResourceError::Validation(format!("name contains invalid characters: '{name}'")));
    }
    Ok(())
}

/// Ticket odates are empty or up to eight digits.
pub fn validate_ticket_odate(odate: &str) -> Result<(), ResourceError> {
    if odate.len() > 8 || !odate.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ResourceError::Validation(format!("invalid ticket odate: '{odate}'")));
    }
    Ok(())
}

fn ticket_key(name: &str, odate: &str) -> String {
    format!("t:{name}:{odate}")
}

fn flag_key(name: &str) -> String {
    format!("f:{name}")
}

/// Owner of ticket and flag state.
///
/// Tickets and flags use separate stores, each with its own lock, so ticket
/// traffic never contends with flag traffic.
pub struct ResourceManager {
    tickets: Arc<ResourceStore<TicketResource>>,
    flags: Arc<ResourceStore<FlagState>>,
}

impl ResourceManager {
    /// Manager over the given stores.
    pub fn new(tickets: ResourceStore<TicketResource>, flags: ResourceStore<FlagState>) -> Self {
        Self {
            tickets: Arc::new(tickets),
            flags: Arc::new(flags),
        }
    }

    /// Manager with non persistent stores.
    pub fn in_memory() -> Self {
        Self::new(ResourceStore::in_memory("tickets"), ResourceStore::in_memory("flags"))
    }

    /// Add a ticket. Tickets with the same name but different odates are distinct.
    pub fn add_ticket(&self, name: &str, odate: &str) -> Result<(), ResourceError> {
        validate_name(name)?;
        validate_ticket_odate(odate)?;
        let ticket = TicketResource {
            name: name.to_string(),
            odate: odate.to_string(),
        };
        self.tickets.insert(&ticket_key(name, odate), ticket)?;
        info!(ticket = name, odate, "ticket added");
        Ok(())
    }

    /// Delete a ticket with an exact name and odate.
    pub fn delete_ticket(&self, name: &str, odate: &str) -> Result<(), ResourceError> {
        validate_name(name)?;
        validate_ticket_odate(odate)?;
        self.tickets
            .delete(&ticket_key(name, odate))
            .ok_or(ResourceError::NotFound)?;
        info!(ticket = name, odate, "ticket deleted");
        Ok(())
    }

    /// Exact existence test.
    pub fn check_ticket(&self, name: &str, odate: &str) -> bool {
        self.tickets.contains(&ticket_key(name, odate))
    }

    /// Tickets whose name and odate start with the given prefixes, sorted.
    pub fn list_tickets(&self, name_prefix: &str, odate_prefix: &str) -> Vec<TicketResource> {
        let mut result: Vec<TicketResource> = self
            .tickets
            .all()
            .into_iter()
            .filter(|t| t.name.starts_with(name_prefix) && t.odate.starts_with(odate_prefix))
            .collect();
        result.sort();
        result
    }

    /// Set a flag with the given policy.
    ///
    /// An exclusive holder blocks every further set; shared holders block an
    /// exclusive set.
    pub fn set_flag(&self, name: &str, policy: FlagPolicy) -> Result<(), ResourceError> {
        validate_name(name)?;
        let key = flag_key(name);
        self.flags.modify(|flags| match flags.get(&key).map(|s| s.unpack()) {
            None => {
                flags.insert(key, FlagState::pack(policy, 1));
                Ok(())
            }
            Some((FlagPolicy::Exclusive, _)) => Err(match policy {
                FlagPolicy::Exclusive => ResourceError::FlagExclusiveInUse,
                FlagPolicy::Shared => ResourceError::FlagSharedBlockedByExclusive,
            }),
            Some((FlagPolicy::Shared, count)) => {
                if policy == FlagPolicy::Exclusive && count != 0 {
                    return Err(ResourceError::FlagExclusiveBlockedByShared);
                }
                flags.insert(key, FlagState::pack(policy, count + 1));
                Ok(())
            }
        })?;
        debug!(flag = name, policy = %policy, "flag set");
        Ok(())
    }

    /// Release one hold on a flag; the flag is removed at zero.
    pub fn unset_flag(&self, name: &str) -> Result<(), ResourceError> {
        validate_name(name)?;
        let key = flag_key(name);
        self.flags.modify(|flags| {
            let (policy, count) = flags.get(&key).map(|s| s.unpack()).ok_or(ResourceError::NotFound)?;
            if count <= 1 {
                flags.remove(&key);
            } else {
                flags.insert(key, FlagState::pack(policy, count - 1));
            }
            Ok::<(), ResourceError>(())
        })?;
        debug!(flag = name, "flag unset");
        Ok(())
    }

    /// Remove a flag regardless of its holder count.
    pub fn destroy_flag(&self, name: &str) -> Result<(), ResourceError> {
        validate_name(name)?;
        self.flags.delete(&flag_key(name)).ok_or(ResourceError::NotFound)?;
        warn!(flag = name, "flag destroyed");
        Ok(())
    }

    /// Flags whose name starts with the prefix, sorted by name.
    pub fn list_flags(&self, name_prefix: &str) -> Vec<FlagResource> {
        let mut result: Vec<FlagResource> = self
            .flags
            .entries()
            .into_iter()
            .filter_map(|(key, state)| {
                let name = key.strip_prefix("f:")?;
                if !name.starts_with(name_prefix) {
                    return None;
                }
                let (policy, count) = state.unpack();
                Some(FlagResource {
                    name: name.to_string(),
                    policy,
                    count,
                })
            })
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Annotate a ticket batch with existence.
    pub fn check_tickets(&self, mut tickets: Vec<CheckedTicket>) -> Vec<CheckedTicket> {
        for ticket in &mut tickets {
            ticket.fulfilled = self.check_ticket(&ticket.name, &ticket.odate);
        }
        tickets
    }

    /// Apply a ticket action batch. Individual failures are logged and do not
    /// stop the batch; returns false if any action failed.
    pub fn process_ticket_actions(&self, actions: &[TicketActionItem]) -> bool {
        let mut all_ok = true;
        for item in actions {
            let result = match item.action {
                TicketAction::Add => self.add_ticket(&item.name, &item.odate),
                TicketAction::Remove => self.delete_ticket(&item.name, &item.odate),
            };
            if let Err(e) = result {
                warn!(ticket = %item.name, odate = %item.odate, action = ?item.action, error = %e, "ticket action failed");
                all_ok = false;
            }
        }
        all_ok
    }

    /// Set every requested flag or none: on the first failure all flags set
    /// so far are released.
    pub fn acquire_flags(&self, flags: &[FlagRequest]) -> (bool, Vec<String>) {
        let mut acquired: Vec<&str> = Vec::with_capacity(flags.len());
        for flag in flags {
            if let Err(e) = self.set_flag(&flag.name, flag.policy) {
                for name in acquired {
                    if let Err(e) = self.unset_flag(name) {
                        warn!(flag = name, error = %e, "rollback of flag failed");
                    }
                }
                return (false, vec![format!("{}: {e}", flag.name)]);
            }
            acquired.push(&flag.name);
        }
        (true, Vec::new())
    }

    /// Unset every named flag; returns the names that failed.
    pub fn release_flags(&self, names: &[String]) -> (bool, Vec<String>) {
        let failed: Vec<String> = names
            .iter()
            .filter_map(|name| self.unset_flag(name).err().map(|e| format!("{name}: {e}")))
            .collect();
        (failed.is_empty(), failed)
    }

    /// Persist both stores now.
    pub fn sync(&self) -> Result<(), ResourceError> {
        self.tickets.sync()?;
        self.flags.sync()?;
        Ok(())
    }

    /// Spawn the sync loops for both stores.
    pub fn watch(
        &self,
        ticket_interval: Duration,
        flag_interval: Duration,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            self.tickets.watch(ticket_interval, shutdown.clone()),
            self.flags.watch(flag_interval, shutdown.clone()),
        ]
    }
}

impl EventParticipant for ResourceManager {
    fn process(&self, route: RouteName, msg: &DispatchedMessage) -> Result<EventResponse, DispatchError> {
        match (&msg.message, route) {
            (EventMessage::TicketCheck(check), RouteName::TicketCheck) => {
                let mut out = check.clone();
                out.tickets = self.check_tickets(out.tickets);
                Ok(EventResponse::TicketCheck(out))
            }
            (EventMessage::TicketAction(actions), RouteName::TicketAction) => {
                self.process_ticket_actions(&actions.tickets);
                Ok(EventResponse::Ack)
            }
            (EventMessage::FlagAcquire(req), RouteName::FlagAcquire) => {
                let (success, conflicts) = self.acquire_flags(&req.flags);
                Ok(EventResponse::Flags { success, conflicts })
            }
            (EventMessage::FlagRelease(req), RouteName::FlagRelease) => {
                let (success, conflicts) = self.release_flags(&req.names);
                Ok(EventResponse::Flags { success, conflicts })
            }
            (
                EventMessage::TicketCheck(_)
                | EventMessage::TicketAction(_)
                | EventMessage::FlagAcquire(_)
                | EventMessage::FlagRelease(_),
                _,
            ) => Err(DispatchError::UnrecognizedMessageFormat),
            (EventMessage::Tick(_) | EventMessage::Journal(_), _) => Err(DispatchError::InvalidRouteName(route)),
        }
    }
}
