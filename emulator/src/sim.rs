//! Simulated board behind the `apollo-core` hardware traits.
//!
//! Every handle shares one [`SimBoard`] so the session can inspect and steer
//! the hardware while the control plane owns the handles. Blocking delays
//! advance the simulated clock instead of sleeping.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use apollo_core::fpga::status::{FLAG_BUSY, FLAG_DONE, FLAG_EXECUTION_FAIL, IR_LENGTH};
use apollo_core::fpga::{ProgramLine, READ_STATUS, TapDriver, TapState};
use apollo_core::timing::{BlockingDelay, Monotonic, Tick};
use apollo_core::usb_switch::{PortHardware, PortOwner};

/// STATUS reads that report BUSY after PROGRAM is released.
pub const CONFIGURATION_READS: u32 = 3;

/// What the FPGA does with its configuration image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FpgaImage {
    /// Configures cleanly.
    Good,
    /// Fails with a CRC mismatch.
    Corrupt,
    /// Never leaves BUSY.
    Hang,
}

impl FpgaImage {
    pub const fn label(self) -> &'static str {
        match self {
            FpgaImage::Good => "good",
            FpgaImage::Corrupt => "crc",
            FpgaImage::Hang => "hang",
        }
    }
}

/// BSE_ERROR_CODE for a CRC mismatch.
const CRC_MISMATCH_CODE: u32 = 0b011;

#[derive(Debug)]
struct FpgaModel {
    /// Image loaded on the next PROGRAM release.
    image: FpgaImage,
    /// Image loaded at the last release; `None` while held in reset.
    loaded: Option<FpgaImage>,
    program_low: bool,
    busy_reads: u32,
}

impl FpgaModel {
    fn status_word(&mut self) -> u32 {
        let Some(loaded) = self.loaded else {
            return 0;
        };
        if loaded == FpgaImage::Hang {
            return FLAG_BUSY;
        }
        if self.busy_reads > 0 {
            self.busy_reads -= 1;
            return FLAG_BUSY;
        }

        match loaded {
            FpgaImage::Good => FLAG_DONE,
            FpgaImage::Corrupt => (CRC_MISMATCH_CODE << 23) | FLAG_EXECUTION_FAIL,
            FpgaImage::Hang => FLAG_BUSY,
        }
    }

    fn set_program_low(&mut self, low: bool) {
        if low {
            self.loaded = None;
        } else if self.program_low {
            self.loaded = Some(self.image);
            self.busy_reads = CONFIGURATION_READS;
        }
        self.program_low = low;
    }
}

#[derive(Debug)]
struct TapModel {
    open: bool,
    state: TapState,
    instruction: u8,
}

/// Shared state of the simulated board.
#[derive(Debug)]
pub struct SimBoard {
    now: Tick,
    button_pressed: bool,
    connected: bool,
    routed_to: Option<PortOwner>,
    indicator: bool,
    fpga: FpgaModel,
    tap: TapModel,
}

impl SimBoard {
    /// Powered board with a configured FPGA and PROGRAM released.
    pub fn new() -> Self {
        Self {
            now: Tick::ZERO,
            button_pressed: false,
            connected: false,
            routed_to: None,
            indicator: false,
            fpga: FpgaModel {
                image: FpgaImage::Good,
                loaded: Some(FpgaImage::Good),
                program_low: false,
                busy_reads: 0,
            },
            tap: TapModel {
                open: false,
                state: TapState::TestLogicReset,
                instruction: 0,
            },
        }
    }

    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now = self.now.wrapping_add(duration);
    }

    pub fn set_button(&mut self, pressed: bool) {
        self.button_pressed = pressed;
    }

    pub fn button_pressed(&self) -> bool {
        self.button_pressed
    }

    pub fn set_image(&mut self, image: FpgaImage) {
        self.fpga.image = image;
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn routed_to(&self) -> Option<PortOwner> {
        self.routed_to
    }

    pub fn indicator(&self) -> bool {
        self.indicator
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SimBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routed = self.routed_to().map_or("unset", PortOwner::label);
        writeln!(
            f,
            "sim clock={}ms button={}",
            self.now.as_millis(),
            if self.button_pressed() { "pressed" } else { "released" }
        )?;
        writeln!(
            f,
            "sim port mux={routed} pullup={} led={}",
            if self.connected() { "on" } else { "off" },
            if self.indicator() { "on" } else { "off" }
        )?;
        write!(
            f,
            "sim fpga next-image={} loaded={} program={}",
            self.fpga.image.label(),
            self.fpga.loaded.map_or("none", FpgaImage::label),
            if self.fpga.program_low { "low" } else { "released" }
        )
    }
}

pub type SharedBoard = Rc<RefCell<SimBoard>>;

#[derive(Clone)]
pub struct SimClock(pub SharedBoard);

impl Monotonic for SimClock {
    fn now(&self) -> Tick {
        self.0.borrow().now()
    }
}

/// Delays move the simulated clock forward; spins cost nothing.
#[derive(Clone)]
pub struct SimDelay(pub SharedBoard);

impl BlockingDelay for SimDelay {
    fn delay(&mut self, duration: Duration) {
        self.0.borrow_mut().advance(duration);
    }

    fn spin(&mut self, _cycles: u32) {}
}

pub struct SimPort(pub SharedBoard);

impl PortHardware for SimPort {
    fn disconnect(&mut self) {
        self.0.borrow_mut().connected = false;
    }

    fn connect(&mut self) {
        self.0.borrow_mut().connected = true;
    }

    fn route_to(&mut self, owner: PortOwner) {
        self.0.borrow_mut().routed_to = Some(owner);
    }

    fn set_indicator(&mut self, lit: bool) {
        self.0.borrow_mut().indicator = lit;
    }
}

pub struct SimProgram(pub SharedBoard);

impl ProgramLine for SimProgram {
    fn release(&mut self) {
        self.0.borrow_mut().fpga.set_program_low(false);
    }

    fn drive_low(&mut self) {
        self.0.borrow_mut().fpga.set_program_low(true);
    }
}

/// TAP that answers READ_STATUS from the FPGA model.
pub struct SimTap(pub SharedBoard);

impl TapDriver for SimTap {
    fn init(&mut self) {
        let mut board = self.0.borrow_mut();
        board.tap.open = true;
        board.tap.state = TapState::TestLogicReset;
    }

    fn deinit(&mut self) {
        self.0.borrow_mut().tap.open = false;
    }

    fn go_to_state(&mut self, state: TapState) {
        self.0.borrow_mut().tap.state = state;
    }

    fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], bits: usize, advance_state: bool) {
        let mut board = self.0.borrow_mut();
        let board = &mut *board;

        match board.tap.state {
            TapState::ShiftIr if bits == IR_LENGTH => {
                board.tap.instruction = tdi.first().copied().unwrap_or(0);
            }
            TapState::ShiftDr if board.tap.open && board.tap.instruction == READ_STATUS => {
                let word = board.fpga.status_word().to_le_bytes();
                for (out, byte) in tdo.iter_mut().zip(word) {
                    *out = byte;
                }
            }
            _ => tdo.fill(0),
        }

        if advance_state {
            board.tap.state = board.tap.state.next(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_core::fpga::{BitstreamError, StatusProtocol, StatusRegister};

    #[test]
    fn released_program_configures_after_busy_reads() {
        let board = SimBoard::shared();
        let mut program = SimProgram(board.clone());
        let mut status = StatusProtocol::new(SimTap(board.clone()), SimDelay(board.clone()));

        program.drive_low();
        assert_eq!(status.query_status(), StatusRegister::from_bits(0));

        program.release();
        for _ in 0..CONFIGURATION_READS {
            assert!(status.query_status().busy());
        }
        assert!(status.query_status().done());
    }

    #[test]
    fn corrupt_image_reports_crc_mismatch() {
        let board = SimBoard::shared();
        board.borrow_mut().set_image(FpgaImage::Corrupt);
        let mut program = SimProgram(board.clone());
        let mut status = StatusProtocol::new(SimTap(board.clone()), SimDelay(board.clone()));

        program.drive_low();
        program.release();

        assert!(!status.is_configuration_ok());
        assert_eq!(
            status.query_status().bitstream_error(),
            Some(BitstreamError::CrcMismatch)
        );
    }

    #[test]
    fn delays_advance_the_clock() {
        let board = SimBoard::shared();
        let mut delay = SimDelay(board.clone());

        delay.delay(Duration::from_millis(100));

        assert_eq!(SimClock(board).now(), Tick::from_millis(100));
    }
}
