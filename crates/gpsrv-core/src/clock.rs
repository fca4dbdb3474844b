//! Time source for request handling
//!
//! The services take `now` as an argument; the HTTP layer obtains it from
//! a [`Clock`] so tests can move time across the cooldown window.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
