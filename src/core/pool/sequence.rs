//! Order id generation.
//!
//! An order id is five base62 characters: the ISO week of the current order
//! date followed by a two digit `hi` and a two digit `lo` counter. `hi` is
//! persisted and advanced on every start so ids are not reissued after a
//! restart within the same cycle.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::collection::{CollectionExt, DataCollection};
use crate::core::CollectionError;
use crate::util::unique::BASE62;
use crate::util::{Odate, TaskOrderId};

const SEQUENCE_KEY: &str = "orderid_sequence";

/// Largest two digit base62 value.
pub const SEQ_MAX: u16 = 3843;

#[derive(Debug, Serialize, Deserialize)]
struct SequenceModel {
    value: u16,
}

#[derive(Debug)]
struct Counters {
    hi: u16,
    lo: u16,
}

/// Mints unique [`TaskOrderId`]s.
pub struct SequenceGenerator {
    counters: Mutex<Counters>,
    collection: Option<Arc<dyn DataCollection>>,
}

impl SequenceGenerator {
    /// Generator without persistence, starting at `hi`.
    pub fn in_memory(hi: u16) -> Self {
        Self {
            counters: Mutex::new(Counters { hi: hi.min(SEQ_MAX), lo: 0 }),
            collection: None,
        }
    }

    /// Load `hi` from the collection, advance it and store it back.
    pub fn load(collection: Arc<dyn DataCollection>) -> Result<Self, CollectionError> {
        let stored = match collection.get_as::<SequenceModel>(SEQUENCE_KEY) {
            Ok(model) => model.value,
            Err(CollectionError::NotFound(_)) => SEQ_MAX,
            Err(e) => return Err(e),
        };
        if stored > SEQ_MAX {
            return Err(CollectionError::Backend(format!("sequence hi value out of range: {stored}")));
        }
        let hi = if stored == SEQ_MAX { 0 } else { stored + 1 };
        collection.put_as(SEQUENCE_KEY, &SequenceModel { value: hi })?;
        info!(hi, "order id sequence loaded");
        Ok(Self {
            counters: Mutex::new(Counters { hi, lo: 0 }),
            collection: Some(collection),
        })
    }

    /// Next id for the given order date.
    pub fn next(&self, odate: &Odate) -> TaskOrderId {
        let (hi, lo, rolled) = {
            let mut c = self.counters.lock();
            c.lo += 1;
            let mut rolled = false;
            if c.lo > SEQ_MAX {
                c.lo = 0;
                c.hi = if c.hi >= SEQ_MAX { 0 } else { c.hi + 1 };
                rolled = true;
            }
            (c.hi, c.lo, rolled)
        };

        if rolled {
            if let Some(col) = &self.collection {
                if let Err(e) = col.put_as(SEQUENCE_KEY, &SequenceModel { value: hi }) {
                    warn!(error = %e, "unable to persist order id sequence");
                }
            }
        }

        let week = odate.iso_week() as usize % BASE62.len();
        let chars = [
            BASE62[week],
            BASE62[usize::from(hi / 62 % 62)],
            BASE62[usize::from(hi % 62)],
            BASE62[usize::from(lo / 62 % 62)],
            BASE62[usize::from(lo % 62)],
        ];
        TaskOrderId::new(chars.iter().map(|&b| char::from(b)).collect::<String>())
    }
}
