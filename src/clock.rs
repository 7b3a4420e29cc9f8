use std::time::Duration;

use chrono::{DateTime, Utc};

/// Time source for settle delays, grace periods and wisp timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Wall clock backed by `chrono::Utc` and `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Clock whose `sleep` advances virtual time and appends to a shared
    /// event log, so ordering against tmux calls can be asserted.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl ManualClock {
        pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                now: Mutex::new(Utc::now()),
                log,
            }
        }

        pub fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.log
                .lock()
                .unwrap()
                .push(format!("sleep {}ms", duration.as_millis()));
            let by = chrono::Duration::from_std(duration).unwrap_or_default();
            self.advance(by);
        }
    }

    #[test]
    fn manual_clock_advances_on_sleep() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let clock = ManualClock::new(log.clone());
        let start = clock.now();
        clock.sleep(Duration::from_millis(500));
        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(500));
        assert_eq!(log.lock().unwrap().as_slice(), ["sleep 500ms"]);
    }
}
