use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks the sandbox host's tick counter and its simulated tick rate.
///
/// Shared between the scheduler (which advances it) and the host surface
/// (which reports it), so both sides agree on "now" without locking.
#[derive(Debug)]
pub struct HostClock {
    tick: AtomicU64,
    rate_bits: AtomicU64,
    target_rate: f64,
}

impl HostClock {
    /// Create a clock at tick 0 running at its target rate.
    pub fn new(target_rate: f64) -> Self {
        Self {
            tick: AtomicU64::new(0),
            rate_bits: AtomicU64::new(target_rate.to_bits()),
            target_rate,
        }
    }

    /// Advance the clock by one tick. Returns the new tick number.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Return the current tick number.
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// The most recent tick-rate sample.
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Acquire))
    }

    /// Override the reported tick rate, e.g. to simulate lag.
    pub fn set_rate(&self, rate: f64) {
        self.rate_bits.store(rate.to_bits(), Ordering::Release);
    }

    /// The nominal steps per second.
    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    /// Wall-clock seconds the elapsed ticks represent at the target rate.
    pub fn elapsed_seconds(&self) -> f64 {
        self.tick() as f64 / self.target_rate
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new(20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_initial_state() {
        let clock = HostClock::default();
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.rate(), 20.0);
        assert_eq!(clock.elapsed_seconds(), 0.0);
    }

    #[test]
    fn clock_advance_increments() {
        let clock = HostClock::new(20.0);
        clock.advance();
        clock.advance();
        assert_eq!(clock.advance(), 3);
        assert_eq!(clock.tick(), 3);
        assert!((clock.elapsed_seconds() - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn clock_rate_override() {
        let clock = HostClock::new(20.0);
        clock.set_rate(14.5);
        assert_eq!(clock.rate(), 14.5);
        assert_eq!(clock.target_rate(), 20.0);
    }
}
