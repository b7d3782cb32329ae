//! Periodic timer driving the pool and the daily procedure.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::events::{EventDispatcher, EventMessage, RouteName, TickMsg};
use crate::util::now_local;

/// Pushes a `Tick` message at a fixed interval.
pub struct Ticker {
    dispatcher: Arc<EventDispatcher>,
    interval: Duration,
}

impl Ticker {
    /// Ticker over a dispatcher. A zero interval is raised to one second.
    pub fn new(dispatcher: Arc<EventDispatcher>, interval: Duration) -> Self {
        let interval = if interval.is_zero() { Duration::from_secs(1) } else { interval };
        Self { dispatcher, interval }
    }

    /// Deliver one tick.
    pub fn tick(&self, now: NaiveDateTime) {
        let msg = EventMessage::Tick(TickMsg { time: now });
        if let Err(e) = self.dispatcher.push_event(None, RouteName::Tick, msg) {
            debug!(error = %e, "tick not delivered");
        }
    }

    /// Spawn the timer loop until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.interval, "ticker started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick(now_local()),
                    () = shutdown.cancelled() => break,
                }
            }
            info!("ticker stopped");
        })
    }
}
