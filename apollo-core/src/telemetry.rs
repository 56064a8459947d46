//! Event history for port handoffs and FPGA configuration activity.
//!
//! The control task records every state change it causes into a bounded ring
//! so the console can show recent history without any allocation. The firmware
//! mirrors each record to defmt; the emulator prints them.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::fpga::StatusRegister;
use crate::timing::Tick;
use crate::usb_switch::OwnershipChange;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Records retained by default.
pub const EVENT_LOG_CAPACITY: usize = 32;

/// Something the control task did or observed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// The heartbeat receiver was enabled and primed.
    HeartbeatLinkStarted,
    /// The shared USB port changed hands.
    Ownership(OwnershipChange),
    /// PROGRAM was pulsed.
    Reconfigured,
    /// PROGRAM is held low.
    HeldOffline,
    /// PROGRAM was released without a pulse.
    ProgramReleased,
    /// A configuration check finished.
    ConfigurationChecked { ok: bool, status: StatusRegister },
    /// A bounded configuration check gave up with BUSY still set.
    ConfigurationTimedOut { polls: u32 },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::HeartbeatLinkStarted => f.write_str("heartbeat link started"),
            Event::Ownership(change) => write!(
                f,
                "port {} -> {} ({})",
                change.from,
                change.to,
                change.reason.label()
            ),
            Event::Reconfigured => f.write_str("fpga reconfiguration triggered"),
            Event::HeldOffline => f.write_str("fpga held offline"),
            Event::ProgramReleased => f.write_str("fpga program released"),
            Event::ConfigurationChecked { ok, status } => {
                let verdict = if *ok { "ok" } else { "failed" };
                write!(f, "configuration {verdict} [{status}]")
            }
            Event::ConfigurationTimedOut { polls } => {
                write!(f, "configuration check timed out after {polls} polls")
            }
        }
    }
}

/// One entry in the event log.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    pub at: Tick,
    pub event: Event,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} @{}ms {}", self.id, self.at.as_millis(), self.event)
    }
}

/// Fixed-capacity ring of [`EventRecord`]s; the oldest entry is overwritten.
pub struct EventLog<const CAPACITY: usize = EVENT_LOG_CAPACITY> {
    ring: HistoryBuf<EventRecord, CAPACITY>,
    next_id: EventId,
}

impl<const CAPACITY: usize> EventLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
        }
    }

    /// Appends `event` and returns the stored record.
    pub fn record(&mut self, event: Event, at: Tick) -> EventRecord {
        let record = EventRecord {
            id: self.next_id,
            at,
            event,
        };
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(record);
        record
    }

    /// Convenience wrapper for arbiter results; `None` records nothing.
    pub fn record_change(
        &mut self,
        change: Option<OwnershipChange>,
        at: Tick,
    ) -> Option<EventRecord> {
        change.map(|change| self.record(Event::Ownership(change), at))
    }

    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, EventRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&EventRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.recent().is_none()
    }
}

impl<const CAPACITY: usize> Default for EventLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
