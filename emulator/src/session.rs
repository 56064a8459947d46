//! Console session against the simulated board.
//!
//! Lines starting with `sim` steer the simulation; everything else goes to
//! the same console the firmware serves over USB.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use apollo_core::board::{BoardConfig, BoardFamily, BoardRevision};
use apollo_core::console::{ConsoleError, run_line};
use apollo_core::control::{ControlHardware, ControlPlane};
use apollo_core::telemetry::EventId;
use apollo_core::timing::{Monotonic, Tick};
use apollo_core::usb_switch::{ADVERTISEMENT_MARKER, AdvertisementReceiver, ButtonSample};
use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::{Caseless, dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, terminated};

use crate::sim::{
    FpgaImage, SharedBoard, SimBoard, SimClock, SimDelay, SimPort, SimProgram, SimTap,
};

/// Arbiter poll interval, matching the firmware's control loop.
pub const POLL_PERIOD: Duration = Duration::from_millis(10);

pub const SIM_USAGE: &str =
    "sim tick <ms>|adv [bad]|button press|release|image good|crc|hang|state";

type SimPlane<'a> = ControlPlane<'a, SimPort, SimProgram, SimTap, SimDelay>;

/// Commands that act on the simulation rather than the console.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimCommand {
    /// Run the control loop for this many milliseconds.
    Tick(u32),
    /// One advertisement byte on the heartbeat line.
    Advertise { parity_error: bool },
    Button { pressed: bool },
    Image(FpgaImage),
    State,
}

/// Board selectable from the command line.
pub fn board_from_tag(tag: &str) -> Result<BoardConfig, String> {
    let (family, revision) = if tag.eq_ignore_ascii_case("cynthion") {
        (BoardFamily::Cynthion, BoardRevision::new(1, 4))
    } else if tag.eq_ignore_ascii_case("cynthion-r0.5") {
        (BoardFamily::Cynthion, BoardRevision::new(0, 5))
    } else if tag.eq_ignore_ascii_case("urti") {
        (BoardFamily::Urti, BoardRevision::new(1, 0))
    } else if tag.eq_ignore_ascii_case("luna-d21") {
        (BoardFamily::LunaD21, BoardRevision::new(0, 7))
    } else {
        return Err(format!("Unknown board `{tag}`"));
    };
    Ok(BoardConfig::new(family, revision))
}

pub struct Session<'a> {
    board: SharedBoard,
    clock: SimClock,
    heartbeat: &'a AdvertisementReceiver,
    plane: SimPlane<'a>,
    next_event: EventId,
    transcript: Option<TranscriptLogger>,
}

impl<'a> Session<'a> {
    /// Powers the simulated board and runs the start-up sequence.
    pub fn new(config: BoardConfig, heartbeat: &'a AdvertisementReceiver) -> Self {
        let board = SimBoard::shared();
        let hardware = ControlHardware {
            port: SimPort(board.clone()),
            program: SimProgram(board.clone()),
            tap: SimTap(board.clone()),
        };
        let plane = ControlPlane::new(config, heartbeat, hardware, SimDelay(board.clone()));

        let mut session = Self {
            clock: SimClock(board.clone()),
            board,
            heartbeat,
            plane,
            next_event: 0,
            transcript: None,
        };
        let now = session.clock.now();
        session.plane.start(now);
        session
    }

    /// Mirrors every exchange into `path`.
    pub fn with_transcript(mut self, path: &Path) -> io::Result<Self> {
        self.transcript = Some(TranscriptLogger::new(path)?);
        Ok(self)
    }

    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Events recorded since start-up that have not been returned yet.
    pub fn drain_events(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for record in self.plane.events().oldest_first() {
            if record.id >= self.next_event {
                lines.push(format!("* {record}"));
                self.next_event = record.id.wrapping_add(1);
            }
        }
        lines
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        let now = self.now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(now, TranscriptRole::Host, trimmed)?;
        }

        let mut lines = match parse_sim(trimmed) {
            Some(Ok(command)) => self.run_sim(command),
            Some(Err(())) => vec![format!("ERR usage: {SIM_USAGE}")],
            None => match run_line(&mut self.plane, trimmed, now) {
                Ok(reply) => reply.to_string().lines().map(str::to_owned).collect(),
                Err(ConsoleError::Empty) => Vec::new(),
                Err(error) => vec![format!("ERR {error}")],
            },
        };
        lines.extend(self.drain_events());

        if let Some(transcript) = self.transcript.as_mut() {
            let now = self.clock.now();
            for line in &lines {
                transcript.append_line(now, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(lines)
    }

    fn run_sim(&mut self, command: SimCommand) -> Vec<String> {
        match command {
            SimCommand::Tick(millis) => {
                self.tick(millis);
                vec![format!("clock {}ms", self.now().as_millis())]
            }
            SimCommand::Advertise { parity_error } => {
                let disposition = self
                    .heartbeat
                    .on_byte(ADVERTISEMENT_MARKER, parity_error, self.now());
                vec![format!("adv {disposition:?}")]
            }
            SimCommand::Button { pressed } => {
                self.board.borrow_mut().set_button(pressed);
                Vec::new()
            }
            SimCommand::Image(image) => {
                self.board.borrow_mut().set_image(image);
                Vec::new()
            }
            SimCommand::State => self
                .board
                .borrow()
                .to_string()
                .lines()
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Advances the clock in poll-sized steps, polling the arbiter after each.
    ///
    /// Settle delays inside a transfer advance the clock further.
    fn tick(&mut self, millis: u32) {
        let period = u32::try_from(POLL_PERIOD.as_millis()).unwrap_or(u32::MAX);
        let mut remaining = millis;

        while remaining > 0 {
            let step = remaining.min(period);
            remaining -= step;

            self.board
                .borrow_mut()
                .advance(Duration::from_millis(u64::from(step)));
            let button = self.button_sample();
            self.plane.poll(button, self.now());
        }
    }

    fn button_sample(&self) -> ButtonSample {
        if !self.plane.board().capabilities.has_program_button {
            return ButtonSample::Unsupported;
        }
        if self.board.borrow().button_pressed() {
            ButtonSample::Pressed
        } else {
            ButtonSample::Released
        }
    }
}

/// `None` when the line is not a `sim` command at all.
fn parse_sim(line: &str) -> Option<Result<SimCommand, ()>> {
    let mut input = line;
    sim_verb(&mut input).ok()?;
    Some(
        terminated(sim_command, (space0, eof))
            .parse_next(&mut input)
            .map_err(|_| ()),
    )
}

fn sim_verb(input: &mut &str) -> ModalResult<()> {
    (Caseless("sim"), alt((space1.void(), eof.void()))).void().parse_next(input)
}

fn sim_command(input: &mut &str) -> ModalResult<SimCommand> {
    alt((
        preceded((Caseless("tick"), space1), dec_uint).map(SimCommand::Tick),
        preceded(Caseless("adv"), opt(preceded(space1, Caseless("bad"))))
            .map(|bad| SimCommand::Advertise { parity_error: bad.is_some() }),
        preceded(
            (Caseless("button"), space1),
            alt((Caseless("press").value(true), Caseless("release").value(false))),
        )
        .map(|pressed| SimCommand::Button { pressed }),
        preceded(
            (Caseless("image"), space1),
            alt((
                Caseless("good").value(FpgaImage::Good),
                Caseless("crc").value(FpgaImage::Corrupt),
                Caseless("hang").value(FpgaImage::Hang),
            )),
        )
        .map(SimCommand::Image),
        Caseless("state").value(SimCommand::State),
    ))
    .parse_next(input)
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# Apollo emulator transcript")?;
        writeln!(logger.writer, "# Timestamps are simulated milliseconds")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, at: Tick, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            at.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_core::usb_switch::PortOwner;

    fn cynthion() -> BoardConfig {
        board_from_tag("cynthion").expect("known board")
    }

    #[test]
    fn start_up_hands_port_to_fpga() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);

        let events = session.drain_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].contains("heartbeat link started"), "{events:?}");
        assert_eq!(session.board().borrow().routed_to(), Some(PortOwner::Fpga));
    }

    #[test]
    fn missing_heartbeat_takes_the_port_back() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);
        session.drain_events();

        let lines = session.handle_command("sim tick 50").unwrap();
        assert_eq!(lines, ["clock 50ms"]);

        let lines = session.handle_command("sim tick 60").unwrap();
        assert!(lines.iter().any(|line| line.contains("fpga -> apollo")), "{lines:?}");

        let board = session.board().borrow();
        assert_eq!(board.routed_to(), Some(PortOwner::Microcontroller));
        assert!(board.connected());
        assert!(board.indicator());
    }

    #[test]
    fn heartbeat_keeps_the_fpga_online() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);

        for _ in 0..5 {
            session.handle_command("sim adv").unwrap();
            session.handle_command("sim tick 50").unwrap();
        }

        assert_eq!(session.board().borrow().routed_to(), Some(PortOwner::Fpga));
    }

    #[test]
    fn corrupt_image_fails_the_check() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);

        session.handle_command("sim image crc").unwrap();
        let lines = session.handle_command("fpga reconfigure").unwrap();
        assert!(lines[0].starts_with("fpga program="), "{lines:?}");

        let lines = session.handle_command("fpga check").unwrap();
        assert_eq!(lines[0], "fpga configuration failed");
    }

    #[test]
    fn hung_fpga_times_out() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);

        session.handle_command("sim image hang").unwrap();
        session.handle_command("fpga reconfigure").unwrap();
        let lines = session.handle_command("fpga check polls=4").unwrap();

        assert!(lines[0].starts_with("ERR "), "{lines:?}");
    }

    #[test]
    fn sim_usage_and_console_errors() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);
        session.drain_events();

        assert_eq!(
            session.handle_command("sim tick").unwrap(),
            [format!("ERR usage: {SIM_USAGE}")]
        );
        assert_eq!(
            session.handle_command("frobnicate").unwrap(),
            ["ERR unknown command (try `help`)"]
        );
        assert!(session.handle_command("   ").unwrap().is_empty());
    }

    #[test]
    fn sim_prefix_needs_a_word_boundary() {
        assert_eq!(parse_sim("simulate"), None);
        assert_eq!(
            parse_sim("SIM ADV BAD"),
            Some(Ok(SimCommand::Advertise { parity_error: true }))
        );
        assert_eq!(parse_sim("sim tick 25"), Some(Ok(SimCommand::Tick(25))));
    }

    #[test]
    fn button_forces_take_over_on_switch_boards() {
        let heartbeat = AdvertisementReceiver::new();
        let mut session = Session::new(cynthion(), &heartbeat);

        session.handle_command("sim adv").unwrap();
        session.handle_command("sim button press").unwrap();
        session.handle_command("sim tick 10").unwrap();

        assert_eq!(session.board().borrow().routed_to(), Some(PortOwner::Microcontroller));
    }

    #[test]
    fn unknown_board_tag_is_rejected() {
        assert!(board_from_tag("cynthion").is_ok());
        assert!(board_from_tag("bogus").is_err());
    }
}
