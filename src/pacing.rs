use std::time::{Duration, Instant};

/// Time source for every politeness delay, so pacing can be simulated in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Enforces a minimum spacing between consecutive requests.
#[derive(Debug, Clone)]
pub struct Pacer {
    previous: Option<Instant>,
}

impl Pacer {
    pub fn new() -> Self {
        Self { previous: None }
    }

    /// A pacer whose first `wait` counts from `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            previous: Some(start),
        }
    }

    /// Sleeps until `spacing` has elapsed since the previous mark, then marks now.
    pub fn wait(&mut self, clock: &dyn Clock, spacing: Duration) {
        if let Some(previous) = self.previous {
            let due = previous + spacing;
            let now = clock.now();
            if due > now {
                clock.sleep(due - now);
            }
        }
        self.previous = Some(clock.now());
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use super::Clock;

    /// Clock that advances only when slept on.
    pub struct SimulatedClock {
        now: Mutex<Instant>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl SimulatedClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        pub fn advance(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    impl Clock for SimulatedClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            self.advance(duration);
        }
    }
}
