//! Session-gated keepalive timer
//!
//! The timer exists only while a session does. It is armed when the session is
//! created and disarmed the moment the session is torn down; a disarmed timer never
//! completes, so no tick can outlive its session.

use std::future::pending;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic liveness timer owned by the client actor
#[derive(Debug)]
pub struct Keepalive {
    period: Duration,
    timer: Option<Interval>,
}

impl Keepalive {
    /// A disarmed timer that will tick every `period` once armed
    pub fn new(period: Duration) -> Self {
        Self { period, timer: None }
    }

    /// Start ticking; the first tick comes one period from now
    pub fn arm(&mut self) {
        let mut timer = interval_at(Instant::now() + self.period, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    /// Stop ticking
    pub fn disarm(&mut self) {
        self.timer = None;
    }

    /// Whether the timer is running
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Wait for the next tick; pends forever while disarmed
    pub async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => pending::<()>().await,
        }
    }
}
