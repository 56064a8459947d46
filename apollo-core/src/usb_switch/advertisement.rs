//! FPGA port advertisement (heartbeat) receiver.
//!
//! While the FPGA wants the shared USB port it sends `'A'` on a dedicated
//! receive-only serial line. The receive interrupt hands each byte to
//! [`AdvertisementReceiver::on_byte`], which does one atomic store at most.
//! All decisions based on the timestamp happen in the arbiter's task.

use core::time::Duration;

use portable_atomic::{AtomicU32, Ordering};

use crate::timing::Tick;

/// Byte the FPGA sends to advertise that it is driving the port.
pub const ADVERTISEMENT_MARKER: u8 = b'A';

/// Serial parity used on the advertisement link.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Serial framing for the advertisement line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkFraming {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub lsb_first: bool,
}

/// 9600 baud, 8 data bits, even parity, LSB first, receive only.
pub const ADVERTISEMENT_LINK: LinkFraming = LinkFraming {
    baud_rate: 9600,
    data_bits: 8,
    parity: Parity::Even,
    lsb_first: true,
};

/// What the receiver did with a byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ByteDisposition {
    /// Valid marker; the timestamp was refreshed.
    Advertisement,
    /// Parity error; the byte was dropped.
    ParityError,
    /// Valid byte that is not the marker.
    Ignored,
}

/// Single-writer timestamp of the most recent advertisement.
///
/// The interrupt handler is the only writer; task code only reads. The stamp
/// is one 32-bit atomic so no read can observe a half-written value.
pub struct AdvertisementReceiver {
    last_seen: AtomicU32,
}

impl AdvertisementReceiver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_seen: AtomicU32::new(0),
        }
    }

    /// Stamps the current time when the link is enabled, so the heartbeat
    /// timeout is measured from link start rather than from counter zero.
    pub fn prime(&self, now: Tick) {
        self.last_seen.store(now.as_millis(), Ordering::Relaxed);
    }

    /// Interrupt-side handler for one received byte. Never blocks.
    #[must_use]
    pub fn on_byte(&self, byte: u8, parity_error: bool, now: Tick) -> ByteDisposition {
        if parity_error {
            return ByteDisposition::ParityError;
        }

        if byte == ADVERTISEMENT_MARKER {
            self.last_seen.store(now.as_millis(), Ordering::Relaxed);
            ByteDisposition::Advertisement
        } else {
            ByteDisposition::Ignored
        }
    }

    /// Timestamp of the most recent advertisement (or of priming).
    #[must_use]
    pub fn last_advertisement(&self) -> Tick {
        Tick::from_millis(self.last_seen.load(Ordering::Relaxed))
    }

    /// Time since the most recent advertisement.
    #[must_use]
    pub fn elapsed(&self, now: Tick) -> Duration {
        now.elapsed_since(self.last_advertisement())
    }

    /// Returns `true` while the last advertisement is younger than `timeout`.
    #[must_use]
    pub fn is_fresh(&self, now: Tick, timeout: Duration) -> bool {
        self.elapsed(now) < timeout
    }
}

impl Default for AdvertisementReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_refreshes_timestamp() {
        let receiver = AdvertisementReceiver::new();
        let now = Tick::from_millis(1_234);

        assert_eq!(
            receiver.on_byte(ADVERTISEMENT_MARKER, false, now),
            ByteDisposition::Advertisement
        );
        assert_eq!(receiver.last_advertisement(), now);
    }

    #[test]
    fn parity_errors_never_refresh() {
        let receiver = AdvertisementReceiver::new();
        receiver.prime(Tick::from_millis(10));

        let disposition = receiver.on_byte(ADVERTISEMENT_MARKER, true, Tick::from_millis(500));

        assert_eq!(disposition, ByteDisposition::ParityError);
        assert_eq!(receiver.last_advertisement(), Tick::from_millis(10));
    }

    #[test]
    fn other_bytes_are_ignored() {
        let receiver = AdvertisementReceiver::new();
        receiver.prime(Tick::from_millis(10));

        for byte in [b'a', b'B', 0x00, 0xff, b'\n'] {
            assert_eq!(
                receiver.on_byte(byte, false, Tick::from_millis(90)),
                ByteDisposition::Ignored
            );
        }
        assert_eq!(receiver.last_advertisement(), Tick::from_millis(10));
    }

    #[test]
    fn freshness_uses_wrapping_elapsed() {
        let receiver = AdvertisementReceiver::new();
        let _ = receiver.on_byte(ADVERTISEMENT_MARKER, false, Tick::from_millis(u32::MAX - 20));

        let timeout = Duration::from_millis(100);
        assert!(receiver.is_fresh(Tick::from_millis(50), timeout));
        assert!(!receiver.is_fresh(Tick::from_millis(80), timeout));
    }
}
