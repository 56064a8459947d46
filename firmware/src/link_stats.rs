#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Counters for the advertisement line.
//!
//! The receive path bumps these next to its call into the heartbeat receiver;
//! the control task reads them to report parity trouble without sharing any
//! mutable state.

use apollo_core::usb_switch::ByteDisposition;
use portable_atomic::{AtomicU32, Ordering};

static MARKERS: AtomicU32 = AtomicU32::new(0);
static PARITY_ERRORS: AtomicU32 = AtomicU32::new(0);
static IGNORED: AtomicU32 = AtomicU32::new(0);

/// Snapshot of the counters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkStats {
    pub markers: u32,
    pub parity_errors: u32,
    pub ignored: u32,
}

/// Counts one received byte by what the receiver did with it.
pub fn record(disposition: ByteDisposition) {
    let counter = match disposition {
        ByteDisposition::Advertisement => &MARKERS,
        ByteDisposition::ParityError => &PARITY_ERRORS,
        ByteDisposition::Ignored => &IGNORED,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> LinkStats {
    LinkStats {
        markers: MARKERS.load(Ordering::Relaxed),
        parity_errors: PARITY_ERRORS.load(Ordering::Relaxed),
        ignored: IGNORED.load(Ordering::Relaxed),
    }
}

impl LinkStats {
    /// Parity errors counted since `earlier`.
    pub const fn new_parity_errors(&self, earlier: &LinkStats) -> u32 {
        self.parity_errors.wrapping_sub(earlier.parity_errors)
    }
}
