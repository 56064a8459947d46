//! Monotonic tick arithmetic and the blocking delay seam.
//!
//! Apollo keeps time with a free-running 32-bit millisecond counter. Elapsed
//! time is always computed with wrapping subtraction so that comparisons stay
//! correct across counter rollover (roughly every 49.7 days).

use core::time::Duration;

/// How long a heartbeat stays "recent" after the last advertisement byte.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(100);

/// Time the shared USB port is held disconnected before it changes hands.
pub const USB_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Minimum time PROGRAM is held low to restart FPGA configuration.
pub const PROGRAM_PULSE: Duration = Duration::from_millis(1);

/// Busy-loop iterations between successive STATUS reads.
pub const STATUS_POLL_SPIN_CYCLES: u32 = 100_000;

/// Millisecond timestamp taken from the board's monotonic counter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Tick(u32);

impl Tick {
    /// Counter value at reset.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw counter value.
    #[must_use]
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Raw counter value in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, tolerant of counter rollover.
    #[must_use]
    pub const fn wrapping_millis_since(self, earlier: Tick) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Elapsed time since `earlier`, tolerant of counter rollover.
    #[must_use]
    pub fn elapsed_since(self, earlier: Tick) -> Duration {
        Duration::from_millis(u64::from(self.wrapping_millis_since(earlier)))
    }

    /// Returns the tick `duration` after `self`, wrapping on overflow.
    #[must_use]
    pub fn wrapping_add(self, duration: Duration) -> Self {
        let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        Self(self.0.wrapping_add(millis))
    }
}

/// Source of the board's millisecond counter.
pub trait Monotonic {
    /// Current counter value.
    fn now(&self) -> Tick;
}

/// Blocking waits used by the PROGRAM pulse, the USB settle delay, and the
/// STATUS poll loop.
///
/// Implementations busy-wait; none of these may be called from interrupt
/// context.
pub trait BlockingDelay {
    /// Blocks for at least `duration`.
    fn delay(&mut self, duration: Duration);

    /// Burns roughly `cycles` CPU cycles without consulting a timer.
    fn spin(&mut self, cycles: u32);
}

impl<T: BlockingDelay + ?Sized> BlockingDelay for &mut T {
    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }

    fn spin(&mut self, cycles: u32) {
        (**self).spin(cycles);
    }
}
