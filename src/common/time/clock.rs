use std::time::Instant as StdInstant;

#[cfg(test)]
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use super::Instant;

/// The time source of a cache. Expiry deadlines are `Instant`s measured from
/// the creation of the clock.
///
/// `now` always reads `std::time::Instant`. With the `quanta` feature,
/// `fast_now` reads the TSC based `quanta` clock instead; it is only used to
/// time loads, where a cheap read matters more than agreement with `now`.
#[derive(Clone)]
pub(crate) struct Clock {
    origin: StdInstant,
    #[cfg(feature = "quanta")]
    fast_origin: quanta::Instant,
    #[cfg(test)]
    mock: Option<Arc<Mock>>,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            origin: StdInstant::now(),
            #[cfg(feature = "quanta")]
            fast_origin: quanta::Instant::now(),
            #[cfg(test)]
            mock: None,
        }
    }
}

impl Clock {
    /// Returns a clock that only advances through the returned `Mock`.
    #[cfg(test)]
    pub(crate) fn mock() -> (Clock, Arc<Mock>) {
        let mock = Arc::new(Mock::default());
        let clock = Clock {
            mock: Some(Arc::clone(&mock)),
            ..Default::default()
        };
        (clock, mock)
    }

    pub(crate) fn now(&self) -> Instant {
        #[cfg(test)]
        if let Some(mock) = &self.mock {
            return Instant::from_nanos(mock.elapsed_nanos());
        }
        Instant::from_duration_since_clock_start(self.origin.elapsed())
    }

    /// Returns the current time from a cheaper, less precise source when one
    /// is available. Only compare two readings of `fast_now`.
    pub(crate) fn fast_now(&self) -> Instant {
        #[cfg(test)]
        if self.mock.is_some() {
            return self.now();
        }
        #[cfg(feature = "quanta")]
        {
            Instant::from_duration_since_clock_start(self.fast_origin.elapsed())
        }
        #[cfg(not(feature = "quanta"))]
        {
            self.now()
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct Mock {
    elapsed_ns: AtomicU64,
}

#[cfg(test)]
impl Mock {
    pub(crate) fn increment(&self, amount: Duration) {
        let nanos = Instant::duration_to_saturating_nanoseconds(amount);
        self.elapsed_ns.fetch_add(nanos, Ordering::AcqRel);
    }

    fn elapsed_nanos(&self) -> u64 {
        self.elapsed_ns.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Clock;

    #[test]
    fn mocked_clock_only_moves_when_told() {
        let (clock, mock) = Clock::mock();
        let start = clock.now();
        assert_eq!(start.as_nanos(), 0);
        assert_eq!(clock.now(), start);

        mock.increment(Duration::from_millis(3));
        assert_eq!(
            clock.now().saturating_duration_since(start),
            Duration::from_millis(3)
        );
        assert_eq!(clock.fast_now(), clock.now());
    }

    #[test]
    fn real_clock_is_monotonic() {
        let clock = Clock::default();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        let fa = clock.fast_now();
        assert!(clock.fast_now() >= fa);
    }
}
