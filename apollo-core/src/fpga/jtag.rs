//! JTAG TAP controller states and the driver seam used by the STATUS readout.
//!
//! Bit shifting itself belongs to the board (bit-banged GPIO on Apollo); this
//! module only names the IEEE 1149.1 states, encodes the TMS transition
//! function, and offers a shortest-path helper for drivers that walk the state
//! machine one TCK at a time.

use core::ops::{Deref, DerefMut};

use heapless::Vec;

/// Longest TMS sequence between any two TAP states.
pub const MAX_TMS_PATH: usize = 8;

/// TMS bits (first bit first) that move the TAP between two states.
pub type TmsPath = Vec<bool, MAX_TMS_PATH>;

/// The sixteen TAP controller states.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

#[cfg(test)]
const ALL_STATES: [TapState; 16] = [
    TapState::TestLogicReset,
    TapState::RunTestIdle,
    TapState::SelectDrScan,
    TapState::CaptureDr,
    TapState::ShiftDr,
    TapState::Exit1Dr,
    TapState::PauseDr,
    TapState::Exit2Dr,
    TapState::UpdateDr,
    TapState::SelectIrScan,
    TapState::CaptureIr,
    TapState::ShiftIr,
    TapState::Exit1Ir,
    TapState::PauseIr,
    TapState::Exit2Ir,
    TapState::UpdateIr,
];

impl TapState {
    const fn index(self) -> usize {
        self as usize
    }

    /// State reached after one TCK with the given TMS level.
    #[must_use]
    pub const fn next(self, tms: bool) -> Self {
        use TapState::{
            CaptureDr, CaptureIr, Exit1Dr, Exit1Ir, Exit2Dr, Exit2Ir, PauseDr, PauseIr,
            RunTestIdle, SelectDrScan, SelectIrScan, ShiftDr, ShiftIr, TestLogicReset, UpdateDr,
            UpdateIr,
        };

        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset | RunTestIdle | UpdateDr | UpdateIr, false) => RunTestIdle,
            (RunTestIdle | UpdateDr | UpdateIr, true) => SelectDrScan,
            (SelectDrScan, false) => CaptureDr,
            (SelectDrScan, true) => SelectIrScan,
            (CaptureDr | ShiftDr | Exit2Dr, false) => ShiftDr,
            (CaptureDr | ShiftDr, true) => Exit1Dr,
            (Exit1Dr | PauseDr, false) => PauseDr,
            (Exit1Dr | Exit2Dr, true) => UpdateDr,
            (PauseDr, true) => Exit2Dr,
            (SelectIrScan, false) => CaptureIr,
            (SelectIrScan, true) => TestLogicReset,
            (CaptureIr | ShiftIr | Exit2Ir, false) => ShiftIr,
            (CaptureIr | ShiftIr, true) => Exit1Ir,
            (Exit1Ir | PauseIr, false) => PauseIr,
            (Exit1Ir | Exit2Ir, true) => UpdateIr,
            (PauseIr, true) => Exit2Ir,
        }
    }

    /// Returns `true` for the two states in which bits are shifted.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, TapState::ShiftDr | TapState::ShiftIr)
    }
}

/// Shortest TMS sequence from `from` to `to`.
///
/// Returns an empty path when the states are equal. `TestLogicReset` is
/// reachable from anywhere in at most five TCKs, so every pair has a path.
#[must_use]
pub fn tms_path(from: TapState, to: TapState) -> TmsPath {
    // Breadth-first search over the 16-state graph; `via` records the
    // predecessor and the TMS level used to reach each state.
    let mut via: [Option<(TapState, bool)>; 16] = [None; 16];
    let mut queue = [from; 16];
    let (mut head, mut tail) = (0, 1);
    let mut seen = [false; 16];
    seen[from.index()] = true;

    while head < tail && !seen[to.index()] {
        let current = queue[head];
        head += 1;

        for tms in [false, true] {
            let next = current.next(tms);
            if !seen[next.index()] {
                seen[next.index()] = true;
                via[next.index()] = Some((current, tms));
                queue[tail] = next;
                tail += 1;
            }
        }
    }

    let mut reversed: TmsPath = Vec::new();
    let mut cursor = to;
    while let Some((previous, tms)) = via[cursor.index()] {
        // The graph diameter is below MAX_TMS_PATH so the push never fails.
        let _ = reversed.push(tms);
        cursor = previous;
    }

    reversed.iter().rev().copied().collect()
}

/// Black-box TAP driver supplied by the board.
pub trait TapDriver {
    /// Claims the JTAG pins and resets the TAP.
    fn init(&mut self);

    /// Releases the JTAG pins.
    fn deinit(&mut self);

    /// Walks the TAP to `state`.
    fn go_to_state(&mut self, state: TapState);

    /// Shifts `bits` bits out of `tdi` while capturing TDO into `tdo`, least
    /// significant bit of byte 0 first.
    ///
    /// The driver must already sit in a shift state. With `advance_state` the
    /// final bit is clocked with TMS high so the TAP leaves the shift state
    /// (Exit1-DR or Exit1-IR).
    fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], bits: usize, advance_state: bool);
}

impl<T: TapDriver + ?Sized> TapDriver for &mut T {
    fn init(&mut self) {
        (**self).init();
    }

    fn deinit(&mut self) {
        (**self).deinit();
    }

    fn go_to_state(&mut self, state: TapState) {
        (**self).go_to_state(state);
    }

    fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], bits: usize, advance_state: bool) {
        (**self).shift(tdi, tdo, bits, advance_state);
    }
}

/// Scoped TAP ownership: `init` on creation, `deinit` on drop.
pub struct TapSession<'a, T: TapDriver> {
    tap: &'a mut T,
}

impl<'a, T: TapDriver> TapSession<'a, T> {
    /// Opens a session on `tap`.
    pub fn open(tap: &'a mut T) -> Self {
        tap.init();
        Self { tap }
    }
}

impl<T: TapDriver> Deref for TapSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.tap
    }
}

impl<T: TapDriver> DerefMut for TapSession<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.tap
    }
}

impl<T: TapDriver> Drop for TapSession<'_, T> {
    fn drop(&mut self) {
        self.tap.deinit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(from: TapState, path: &[bool]) -> TapState {
        path.iter().fold(from, |state, &tms| state.next(tms))
    }

    #[test]
    fn five_ones_reset_from_every_state() {
        for state in ALL_STATES {
            assert_eq!(walk(state, &[true; 5]), TapState::TestLogicReset, "{state:?}");
        }
    }

    #[test]
    fn paths_reach_their_target() {
        for from in ALL_STATES {
            for to in ALL_STATES {
                let path = tms_path(from, to);
                assert_eq!(walk(from, &path), to, "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn idle_to_shift_ir_is_shortest() {
        let path = tms_path(TapState::RunTestIdle, TapState::ShiftIr);
        assert_eq!(path.as_slice(), &[true, true, false, false]);

        let path = tms_path(TapState::Exit1Ir, TapState::PauseIr);
        assert_eq!(path.as_slice(), &[false]);

        assert!(tms_path(TapState::PauseDr, TapState::PauseDr).is_empty());
    }
}
