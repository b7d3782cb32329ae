//! Tickets and flags.
//!
//! Tickets are date scoped existence conditions. Flags are reference counted
//! markers held with a shared or exclusive policy. Both live in independent
//! [`ResourceStore`]s owned by the [`ResourceManager`].

mod expr;
mod manager;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use expr::{build_date_expr, build_expr};
pub use manager::{validate_name, validate_ticket_odate, ResourceManager, MAX_RESOURCE_NAME};
pub use store::{CollectionReadWriter, ResourceReadWriter, ResourceStore};

/// Policy a flag is held with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagPolicy {
    /// Many holders allowed.
    #[serde(rename = "SHR")]
    Shared = 0,
    /// Single holder.
    #[serde(rename = "EXL")]
    Exclusive = 1,
}

impl FlagPolicy {
    const fn from_bits(bits: i64) -> Self {
        if bits == 1 {
            Self::Exclusive
        } else {
            Self::Shared
        }
    }
}

impl fmt::Display for FlagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("SHR"),
            Self::Exclusive => f.write_str("EXL"),
        }
    }
}

/// Named condition scoped to an order date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketResource {
    /// Ticket name.
    pub name: String,
    /// Order date, empty when date independent.
    pub odate: String,
}

/// Snapshot of a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagResource {
    /// Flag name.
    pub name: String,
    /// Policy the flag is currently held with.
    pub policy: FlagPolicy,
    /// Number of holders.
    pub count: u32,
}

/// Persisted flag state: policy in the high 32 bits, count in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagState(i64);

impl FlagState {
    /// Pack a policy and holder count.
    pub const fn pack(policy: FlagPolicy, count: u32) -> Self {
        Self(((policy as i64) << 32) | count as i64)
    }

    /// Split into policy and holder count.
    pub const fn unpack(self) -> (FlagPolicy, u32) {
        (FlagPolicy::from_bits(self.0 >> 32), (self.0 & 0xFFFF_FFFF) as u32)
    }

    /// Raw packed value.
    pub const fn raw(self) -> i64 {
        self.0
    }
}
