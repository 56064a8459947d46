//! Console command execution and reply rendering.
//!
//! Front-ends parse a line, hand the command to [`execute`] together with the
//! current tick, and print the resulting [`Reply`] (or `ERR <reason>`). The
//! platform side implements [`ConsoleBackend`]; in practice that is
//! [`crate::control::ControlPlane`] on both the firmware and the emulator.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use super::ConsoleError;
use super::catalog::Topic;
use super::grammar::{self, ConsoleCommand, FpgaCommand, UsbCommand};
use crate::board::BoardConfig;
use crate::debug_spi::DebugSpiError;
use crate::fpga::{ProgramState, StatusError, StatusRegister};
use crate::telemetry::EventRecord;
use crate::timing::Tick;
use crate::usb_switch::{OwnershipChange, PortOwner};

/// Records returned by `log`.
pub const LOG_REPLY_LEN: usize = 8;

/// STATUS reads allowed by `fpga check` when no limit is given.
pub const DEFAULT_CHECK_POLLS: u32 = 64;

pub type RecentEvents = Vec<EventRecord, LOG_REPLY_LEN>;

/// Point-in-time view rendered by `status`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SystemSnapshot {
    pub board: BoardConfig,
    pub owner: PortOwner,
    pub heartbeat_age: Duration,
    pub heartbeat_fresh: bool,
    pub program: ProgramState,
    pub now: Tick,
}

/// Platform operations reachable from the console.
pub trait ConsoleBackend {
    fn snapshot(&self, now: Tick) -> SystemSnapshot;

    /// Newest records last.
    fn recent_events(&self) -> RecentEvents;

    fn reconfigure(&mut self, now: Tick) -> ProgramState;

    fn hold_offline(&mut self, now: Tick) -> ProgramState;

    fn release_program(&mut self, now: Tick) -> ProgramState;

    fn read_status(&mut self) -> StatusRegister;

    /// Bounded DONE/BUSY/error check.
    ///
    /// # Errors
    ///
    /// [`StatusError::BusyTimeout`] when BUSY outlasts `max_polls` reads.
    fn check_configuration(&mut self, max_polls: u32, now: Tick) -> Result<bool, StatusError>;

    fn port_owner(&self) -> PortOwner;

    fn take_port(&mut self, now: Tick) -> Option<OwnershipChange>;

    fn hand_off_port(&mut self, now: Tick) -> Option<OwnershipChange>;

    fn honor_heartbeat(&mut self, now: Tick) -> Option<OwnershipChange>;

    /// # Errors
    ///
    /// Whatever the debug SPI path rejects the transfer with.
    fn spi_send(&mut self, payload: &[u8]) -> Result<(), DebugSpiError>;
}

/// Successful command output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Status(SystemSnapshot),
    Help(Option<Topic>),
    Log(RecentEvents),
    Program(ProgramState),
    Register(StatusRegister),
    Configuration { ok: bool },
    Owner(PortOwner),
    Transfer {
        change: Option<OwnershipChange>,
        owner: PortOwner,
    },
    SpiSent { len: usize },
}

/// Parses and executes one console line.
///
/// # Errors
///
/// Parse failures and backend failures, as [`ConsoleError`].
pub fn run_line<B>(backend: &mut B, line: &str, now: Tick) -> Result<Reply, ConsoleError>
where
    B: ConsoleBackend + ?Sized,
{
    let command = grammar::parse(line)?;
    execute(backend, &command, now)
}

/// Executes a parsed command against `backend`.
///
/// # Errors
///
/// [`ConsoleError::Status`] for a STATUS timeout and [`ConsoleError::Spi`]
/// for a rejected transfer.
pub fn execute<B>(
    backend: &mut B,
    command: &ConsoleCommand,
    now: Tick,
) -> Result<Reply, ConsoleError>
where
    B: ConsoleBackend + ?Sized,
{
    let reply = match command {
        ConsoleCommand::Status => Reply::Status(backend.snapshot(now)),
        ConsoleCommand::Help(topic) => Reply::Help(*topic),
        ConsoleCommand::Log => Reply::Log(backend.recent_events()),
        ConsoleCommand::Fpga(action) => execute_fpga(backend, *action, now)?,
        ConsoleCommand::Usb(action) => execute_usb(backend, *action, now),
        ConsoleCommand::SpiSend(payload) => {
            backend.spi_send(payload)?;
            Reply::SpiSent { len: payload.len() }
        }
    };

    Ok(reply)
}

fn execute_fpga<B>(backend: &mut B, action: FpgaCommand, now: Tick) -> Result<Reply, ConsoleError>
where
    B: ConsoleBackend + ?Sized,
{
    Ok(match action {
        FpgaCommand::Reconfigure => Reply::Program(backend.reconfigure(now)),
        FpgaCommand::Offline => Reply::Program(backend.hold_offline(now)),
        FpgaCommand::Release => Reply::Program(backend.release_program(now)),
        FpgaCommand::Status => Reply::Register(backend.read_status()),
        FpgaCommand::Check { polls } => {
            let ok = backend.check_configuration(polls.unwrap_or(DEFAULT_CHECK_POLLS), now)?;
            Reply::Configuration { ok }
        }
    })
}

fn execute_usb<B>(backend: &mut B, action: UsbCommand, now: Tick) -> Reply
where
    B: ConsoleBackend + ?Sized,
{
    let change = match action {
        UsbCommand::Owner => return Reply::Owner(backend.port_owner()),
        UsbCommand::Take => backend.take_port(now),
        UsbCommand::HandOff => backend.hand_off_port(now),
        UsbCommand::Honor => backend.honor_heartbeat(now),
    };

    Reply::Transfer {
        change,
        owner: backend.port_owner(),
    }
}

fn program_label(state: ProgramState) -> &'static str {
    match state {
        ProgramState::Released => "released",
        ProgramState::HeldLow => "held-low",
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

impl fmt::Display for SystemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caps = self.board.capabilities;
        writeln!(
            f,
            "board {} {} switch={} button={}",
            self.board.family.label(),
            self.board.revision,
            yes_no(caps.has_usb_switch),
            yes_no(caps.has_program_button),
        )?;
        writeln!(
            f,
            "port owner={} heartbeat={} age={}ms",
            self.owner,
            if self.heartbeat_fresh { "fresh" } else { "stale" },
            self.heartbeat_age.as_millis(),
        )?;
        writeln!(f, "fpga program={}", program_label(self.program))?;
        write!(f, "uptime {}ms", self.now.as_millis())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(snapshot) => snapshot.fmt(f),
            Reply::Help(Some(topic)) => {
                write!(f, "{}\n  {}", topic.usage(), topic.summary())
            }
            Reply::Help(None) => {
                f.write_str("commands:")?;
                for topic in Topic::ALL {
                    write!(f, "\n  {:<8}{}", topic.name(), topic.summary())?;
                }
                Ok(())
            }
            Reply::Log(records) if records.is_empty() => f.write_str("no events"),
            Reply::Log(records) => {
                for (index, record) in records.iter().enumerate() {
                    if index > 0 {
                        f.write_str("\n")?;
                    }
                    record.fmt(f)?;
                }
                Ok(())
            }
            Reply::Program(state) => write!(f, "fpga program={}", program_label(*state)),
            Reply::Register(status) => write!(f, "fpga status {status}"),
            Reply::Configuration { ok: true } => f.write_str("fpga configuration ok"),
            Reply::Configuration { ok: false } => f.write_str("fpga configuration failed"),
            Reply::Owner(owner) => write!(f, "port owner={owner}"),
            Reply::Transfer {
                change: Some(change),
                ..
            } => write!(
                f,
                "port {} -> {} ({})",
                change.from,
                change.to,
                change.reason.label()
            ),
            Reply::Transfer {
                change: None,
                owner,
            } => write!(f, "port unchanged owner={owner}"),
            Reply::SpiSent { len } => write!(f, "spi sent {len} bytes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use core::fmt::Write as _;

    use heapless::String;

    use super::*;
    use crate::board::{BoardFamily, BoardRevision};
    use crate::usb_switch::TransferReason;

    struct Backend {
        owner: PortOwner,
        program: ProgramState,
        status: u32,
        busy_forever: bool,
        last_polls: Option<u32>,
    }

    impl Backend {
        fn new() -> Self {
            Self {
                owner: PortOwner::Fpga,
                program: ProgramState::Released,
                status: 0x100,
                busy_forever: false,
                last_polls: None,
            }
        }

        fn transfer(&mut self, to: PortOwner, reason: TransferReason) -> Option<OwnershipChange> {
            (self.owner != to).then(|| {
                let from = self.owner;
                self.owner = to;
                OwnershipChange { from, to, reason }
            })
        }
    }

    impl ConsoleBackend for Backend {
        fn snapshot(&self, now: Tick) -> SystemSnapshot {
            SystemSnapshot {
                board: BoardConfig::new(BoardFamily::Cynthion, BoardRevision::new(1, 4)),
                owner: self.owner,
                heartbeat_age: Duration::from_millis(12),
                heartbeat_fresh: true,
                program: self.program,
                now,
            }
        }

        fn recent_events(&self) -> RecentEvents {
            RecentEvents::new()
        }

        fn reconfigure(&mut self, _now: Tick) -> ProgramState {
            self.program = ProgramState::Released;
            self.program
        }

        fn hold_offline(&mut self, _now: Tick) -> ProgramState {
            self.program = ProgramState::HeldLow;
            self.program
        }

        fn release_program(&mut self, _now: Tick) -> ProgramState {
            self.program = ProgramState::Released;
            self.program
        }

        fn read_status(&mut self) -> StatusRegister {
            StatusRegister::from_bits(self.status)
        }

        fn check_configuration(&mut self, max_polls: u32, _now: Tick) -> Result<bool, StatusError> {
            self.last_polls = Some(max_polls);
            if self.busy_forever {
                return Err(StatusError::BusyTimeout {
                    polls: max_polls,
                    last_status: StatusRegister::from_bits(0x1000),
                });
            }
            Ok(StatusRegister::from_bits(self.status).is_configuration_ok())
        }

        fn port_owner(&self) -> PortOwner {
            self.owner
        }

        fn take_port(&mut self, _now: Tick) -> Option<OwnershipChange> {
            self.transfer(PortOwner::Microcontroller, TransferReason::HostRequest)
        }

        fn hand_off_port(&mut self, _now: Tick) -> Option<OwnershipChange> {
            self.transfer(PortOwner::Fpga, TransferReason::HostRequest)
        }

        fn honor_heartbeat(&mut self, _now: Tick) -> Option<OwnershipChange> {
            self.transfer(PortOwner::Fpga, TransferReason::HeartbeatHonored)
        }

        fn spi_send(&mut self, _payload: &[u8]) -> Result<(), DebugSpiError> {
            Err(DebugSpiError::Unimplemented)
        }
    }

    fn render(reply: &Reply) -> String<512> {
        let mut text = String::new();
        write!(text, "{reply}").unwrap();
        text
    }

    #[test]
    fn usb_take_then_take_again_is_a_no_op() {
        let mut backend = Backend::new();
        let now = Tick::from_millis(5);

        let first = run_line(&mut backend, "usb take", now).unwrap();
        assert_eq!(render(&first).as_str(), "port fpga -> apollo (host-request)");

        let second = run_line(&mut backend, "usb take", now).unwrap();
        assert_eq!(render(&second).as_str(), "port unchanged owner=apollo");
    }

    #[test]
    fn fpga_check_uses_default_poll_limit() {
        let mut backend = Backend::new();
        let reply = run_line(&mut backend, "fpga check", Tick::ZERO).unwrap();

        assert_eq!(reply, Reply::Configuration { ok: true });
        assert_eq!(backend.last_polls, Some(DEFAULT_CHECK_POLLS));
    }

    #[test]
    fn fpga_check_surfaces_busy_timeout() {
        let mut backend = Backend::new();
        backend.busy_forever = true;

        let error = run_line(&mut backend, "fpga check polls=3", Tick::ZERO).unwrap_err();
        assert!(matches!(
            error,
            ConsoleError::Status(StatusError::BusyTimeout { polls: 3, .. })
        ));
    }

    #[test]
    fn spi_send_reports_unavailable() {
        let mut backend = Backend::new();
        let error = run_line(&mut backend, "spi send 01 02", Tick::ZERO).unwrap_err();

        assert_eq!(error, ConsoleError::Spi(DebugSpiError::Unimplemented));
    }

    #[test]
    fn status_renders_every_line() {
        let mut backend = Backend::new();
        backend.hold_offline(Tick::ZERO);

        let reply = run_line(&mut backend, "status", Tick::from_millis(1_500)).unwrap();
        let text = render(&reply);
        let lines: Vec<&str, 4> = text.lines().collect();

        assert_eq!(
            lines.as_slice(),
            &[
                "board cynthion r1.4 switch=yes button=yes",
                "port owner=fpga heartbeat=fresh age=12ms",
                "fpga program=held-low",
                "uptime 1500ms",
            ]
        );
    }

    #[test]
    fn help_lists_every_topic() {
        let text = render(&Reply::Help(None));
        for topic in Topic::ALL {
            assert!(text.contains(topic.name()), "missing {}", topic.name());
        }
    }
}
