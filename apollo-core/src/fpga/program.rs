//! PROGRAM line control.
//!
//! PROGRAM_N restarts FPGA configuration when pulled low. Apollo never drives
//! it high: "released" means the pin is an input and the board pull-up keeps
//! the line high, so the FPGA is not held in reset by default.

use crate::timing::{BlockingDelay, PROGRAM_PULSE};

/// GPIO seam for the PROGRAM_N pin.
pub trait ProgramLine {
    /// Switches the pin to input with the line pulled high.
    fn release(&mut self);

    /// Switches the pin to output and drives it low.
    fn drive_low(&mut self);
}

impl<T: ProgramLine + ?Sized> ProgramLine for &mut T {
    fn release(&mut self) {
        (**self).release();
    }

    fn drive_low(&mut self) {
        (**self).drive_low();
    }
}

/// Electrical state of the PROGRAM line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProgramState {
    /// Input, pulled high; the FPGA is free to configure.
    Released,
    /// Output, driven low; the FPGA is held deconfigured.
    HeldLow,
}

/// Owns the PROGRAM line and sequences reconfiguration requests.
pub struct ReconfigurationController<P, D> {
    line: P,
    delay: D,
    state: ProgramState,
}

impl<P, D> ReconfigurationController<P, D>
where
    P: ProgramLine,
    D: BlockingDelay,
{
    /// Wraps the pin without touching it; call [`Self::initialize`] before use.
    #[must_use]
    pub const fn new(line: P, delay: D) -> Self {
        Self {
            line,
            delay,
            state: ProgramState::Released,
        }
    }

    /// Puts PROGRAM into its idle, non-driving state.
    pub fn initialize(&mut self) {
        self.line.release();
        self.state = ProgramState::Released;
    }

    /// Pulses PROGRAM low for [`PROGRAM_PULSE`] and releases it.
    ///
    /// Callable at any time, including while the FPGA is held offline. The
    /// caller is responsible for checking the configuration outcome afterwards.
    pub fn trigger_reconfiguration(&mut self) {
        self.line.drive_low();
        self.state = ProgramState::HeldLow;

        self.delay.delay(PROGRAM_PULSE);

        self.line.release();
        self.state = ProgramState::Released;
    }

    /// Drives PROGRAM low and leaves it there.
    ///
    /// The FPGA stays deconfigured until [`Self::trigger_reconfiguration`] or
    /// [`Self::initialize`] releases the line.
    pub fn force_offline(&mut self) {
        self.line.drive_low();
        self.state = ProgramState::HeldLow;
    }

    /// Current line state.
    #[must_use]
    pub const fn state(&self) -> ProgramState {
        self.state
    }

    /// Returns `true` while the FPGA is held deconfigured.
    #[must_use]
    pub const fn is_held_offline(&self) -> bool {
        matches!(self.state, ProgramState::HeldLow)
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use heapless::Vec;

    use super::*;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Op {
        Release,
        DriveLow,
        Delay(Duration),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op, 16>,
    }

    impl Recorder {
        fn push(&mut self, op: Op) {
            self.ops.push(op).expect("recorder full");
        }
    }

    struct Pin<'a>(&'a core::cell::RefCell<Recorder>);

    impl ProgramLine for Pin<'_> {
        fn release(&mut self) {
            self.0.borrow_mut().push(Op::Release);
        }

        fn drive_low(&mut self) {
            self.0.borrow_mut().push(Op::DriveLow);
        }
    }

    struct Delay<'a>(&'a core::cell::RefCell<Recorder>);

    impl BlockingDelay for Delay<'_> {
        fn delay(&mut self, duration: Duration) {
            self.0.borrow_mut().push(Op::Delay(duration));
        }

        fn spin(&mut self, _cycles: u32) {}
    }

    #[test]
    fn trigger_pulses_low_then_releases() {
        let recorder = core::cell::RefCell::new(Recorder::default());
        let mut controller = ReconfigurationController::new(Pin(&recorder), Delay(&recorder));

        controller.initialize();
        controller.trigger_reconfiguration();

        assert_eq!(
            recorder.borrow().ops.as_slice(),
            &[
                Op::Release,
                Op::DriveLow,
                Op::Delay(PROGRAM_PULSE),
                Op::Release
            ]
        );
        assert_eq!(controller.state(), ProgramState::Released);
        assert!(PROGRAM_PULSE >= Duration::from_millis(1));
    }

    #[test]
    fn force_offline_holds_until_released() {
        let recorder = core::cell::RefCell::new(Recorder::default());
        let mut controller = ReconfigurationController::new(Pin(&recorder), Delay(&recorder));

        controller.force_offline();
        assert!(controller.is_held_offline());
        assert_eq!(recorder.borrow().ops.as_slice(), &[Op::DriveLow]);

        controller.initialize();
        assert_eq!(controller.state(), ProgramState::Released);
        assert_eq!(recorder.borrow().ops.last(), Some(&Op::Release));
    }
}
