// 8.0: time service capability. events are stamped with whatever the caller's clock says,
// so replaying nodes can inject the block time.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait TimeService: Send + Sync {
    fn get_time_now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeService for SystemClock {
    fn get_time_now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock for replays and tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    nanos: AtomicI64,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            nanos: AtomicI64::new(now.as_nanos()),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.nanos.store(now.as_nanos(), Ordering::SeqCst);
    }

    pub fn advance(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl TimeService for FixedClock {
    fn get_time_now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
