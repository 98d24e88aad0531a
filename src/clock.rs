use std::time::{Duration, Instant};

/// Monotonic time source used for SDO deadlines and the drive polling loops.
///
/// `now` is measured from an arbitrary, fixed origin.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Absolute point in time on a [`Clock`] after which an operation gives up.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline(Duration);

impl Deadline {
    pub(crate) fn after<C: Clock>(clock: &C, timeout: Duration) -> Self {
        Deadline(clock.now().saturating_add(timeout))
    }

    pub(crate) fn remaining<C: Clock>(&self, clock: &C) -> Duration {
        self.0.saturating_sub(clock.now())
    }

    pub(crate) fn expired<C: Clock>(&self, clock: &C) -> bool {
        clock.now() >= self.0
    }
}
