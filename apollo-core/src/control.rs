//! The supervisor's single owner of port, PROGRAM and STATUS state.
//!
//! [`ControlPlane`] bundles the arbiter, the reconfiguration controller, the
//! STATUS protocol and the event log behind one value that lives in exactly
//! one task. The periodic tick and every console request go through it, so
//! the non-reentrant hardware sequences never interleave.

use heapless::Vec;

use crate::board::BoardConfig;
use crate::console::{ConsoleBackend, LOG_REPLY_LEN, RecentEvents, SystemSnapshot};
use crate::debug_spi::{DebugSpi, DebugSpiError};
use crate::fpga::{
    ProgramLine, ProgramState, ReconfigurationController, StatusError, StatusPollConfig,
    StatusProtocol, StatusRegister, TapDriver,
};
use crate::telemetry::{EVENT_LOG_CAPACITY, Event, EventLog, EventRecord};
use crate::timing::{BlockingDelay, Tick};
use crate::usb_switch::{
    AdvertisementReceiver, ArbiterConfig, ButtonSample, OwnershipChange, PortArbiter,
    PortHardware, PortOwner,
};

/// Hardware handles consumed by [`ControlPlane`].
pub struct ControlHardware<H, P, T> {
    pub port: H,
    pub program: P,
    pub tap: T,
}

/// Timing tunables for every component.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlConfig {
    pub arbiter: ArbiterConfig,
    pub status: StatusPollConfig,
}

/// Everything the control task owns: the port arbiter, PROGRAM and STATUS
/// access, the debug SPI stub and the event log.
pub struct ControlPlane<'a, H, P, T, D, const LOG: usize = EVENT_LOG_CAPACITY> {
    board: BoardConfig,
    arbiter: PortArbiter<'a, H, D>,
    program: ReconfigurationController<P, D>,
    status: StatusProtocol<T, D>,
    spi: DebugSpi,
    events: EventLog<LOG>,
}

impl<'a, H, P, T, D, const LOG: usize> ControlPlane<'a, H, P, T, D, LOG>
where
    H: PortHardware,
    P: ProgramLine,
    T: TapDriver,
    D: BlockingDelay + Clone,
{
    #[must_use]
    pub fn new(
        board: BoardConfig,
        heartbeat: &'a AdvertisementReceiver,
        hardware: ControlHardware<H, P, T>,
        delay: D,
    ) -> Self {
        Self::with_config(board, heartbeat, hardware, delay, ControlConfig::default())
    }

    #[must_use]
    pub fn with_config(
        board: BoardConfig,
        heartbeat: &'a AdvertisementReceiver,
        hardware: ControlHardware<H, P, T>,
        delay: D,
        config: ControlConfig,
    ) -> Self {
        let ControlHardware { port, program, tap } = hardware;

        Self {
            board,
            arbiter: PortArbiter::with_config(
                port,
                delay.clone(),
                heartbeat,
                board.capabilities,
                config.arbiter,
            ),
            program: ReconfigurationController::new(program, delay.clone()),
            status: StatusProtocol::with_config(tap, delay, config.status),
            spi: DebugSpi::new(),
            events: EventLog::new(),
        }
    }

    /// Power-on sequence: release PROGRAM, apply the initial port routing and
    /// enable the heartbeat link.
    pub fn start(&mut self, now: Tick) -> EventRecord {
        self.program.initialize();
        self.arbiter.start();
        self.arbiter.heartbeat().prime(now);
        self.events.record(Event::HeartbeatLinkStarted, now)
    }

    /// Periodic arbiter step; returns the recorded transition, if any.
    pub fn poll(&mut self, button: ButtonSample, now: Tick) -> Option<EventRecord> {
        let change = self.arbiter.poll(button, now);
        self.events.record_change(change, now)
    }

    #[must_use]
    pub const fn board(&self) -> BoardConfig {
        self.board
    }

    #[must_use]
    pub const fn owner(&self) -> PortOwner {
        self.arbiter.owner()
    }

    #[must_use]
    pub const fn events(&self) -> &EventLog<LOG> {
        &self.events
    }

    #[must_use]
    pub const fn port_hardware(&self) -> &H {
        self.arbiter.hardware()
    }

    #[must_use]
    pub const fn program_state(&self) -> ProgramState {
        self.program.state()
    }

    fn record_transfer(
        &mut self,
        change: Option<OwnershipChange>,
        now: Tick,
    ) -> Option<OwnershipChange> {
        self.events.record_change(change, now);
        change
    }
}

impl<H, P, T, D, const LOG: usize> ConsoleBackend for ControlPlane<'_, H, P, T, D, LOG>
where
    H: PortHardware,
    P: ProgramLine,
    T: TapDriver,
    D: BlockingDelay + Clone,
{
    fn snapshot(&self, now: Tick) -> SystemSnapshot {
        SystemSnapshot {
            board: self.board,
            owner: self.arbiter.owner(),
            heartbeat_age: self.arbiter.heartbeat().elapsed(now),
            heartbeat_fresh: self.arbiter.heartbeat_fresh(now),
            program: self.program.state(),
            now,
        }
    }

    fn recent_events(&self) -> RecentEvents {
        let skip = self.events.len().saturating_sub(LOG_REPLY_LEN);
        let mut recent = Vec::new();
        for record in self.events.oldest_first().skip(skip) {
            if recent.push(*record).is_err() {
                break;
            }
        }
        recent
    }

    fn reconfigure(&mut self, now: Tick) -> ProgramState {
        self.program.trigger_reconfiguration();
        self.events.record(Event::Reconfigured, now);
        self.program.state()
    }

    fn hold_offline(&mut self, now: Tick) -> ProgramState {
        self.program.force_offline();
        self.events.record(Event::HeldOffline, now);
        self.program.state()
    }

    fn release_program(&mut self, now: Tick) -> ProgramState {
        self.program.initialize();
        self.events.record(Event::ProgramReleased, now);
        self.program.state()
    }

    fn read_status(&mut self) -> StatusRegister {
        self.status.query_status()
    }

    fn check_configuration(&mut self, max_polls: u32, now: Tick) -> Result<bool, StatusError> {
        match self.status.await_not_busy(Some(max_polls)) {
            Ok(status) => {
                let ok = status.is_configuration_ok();
                self.events.record(Event::ConfigurationChecked { ok, status }, now);
                Ok(ok)
            }
            Err(error @ StatusError::BusyTimeout { polls, .. }) => {
                self.events.record(Event::ConfigurationTimedOut { polls }, now);
                Err(error)
            }
        }
    }

    fn port_owner(&self) -> PortOwner {
        self.arbiter.owner()
    }

    fn take_port(&mut self, now: Tick) -> Option<OwnershipChange> {
        let change = self.arbiter.take_over_from_fpga();
        self.record_transfer(change, now)
    }

    fn hand_off_port(&mut self, now: Tick) -> Option<OwnershipChange> {
        let change = self.arbiter.hand_off_to_fpga();
        self.record_transfer(change, now)
    }

    fn honor_heartbeat(&mut self, now: Tick) -> Option<OwnershipChange> {
        let change = self.arbiter.honor_heartbeat(now);
        self.record_transfer(change, now)
    }

    fn spi_send(&mut self, payload: &[u8]) -> Result<(), DebugSpiError> {
        self.spi.send(payload)?;
        self.spi.send_complete()
    }
}
