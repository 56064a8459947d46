//! FPGA STATUS register readout over JTAG.
//!
//! After PROGRAM is pulsed the FPGA reports configuration progress through its
//! 32-bit STATUS register, read with the `LSC_READ_STATUS` instruction. The
//! success predicate below is the pass/fail contract for configuration and is
//! kept bit-for-bit: DONE set and every error field clear.

use core::fmt;

use super::jtag::{TapDriver, TapSession, TapState};
use crate::timing::{BlockingDelay, STATUS_POLL_SPIN_CYCLES};

/// JTAG instruction that selects the STATUS register.
pub const READ_STATUS: u8 = 0x3C;

/// Instruction register length in bits.
pub const IR_LENGTH: usize = 8;

/// STATUS register length in bits.
pub const STATUS_LENGTH: usize = 32;

pub const FLAG_DONE: u32 = 1 << 8;
pub const FLAG_BUSY: u32 = 1 << 12;
pub const MASK_BSE_ERROR_CODE: u32 = 0b111 << 23;
pub const FLAG_EXECUTION_FAIL: u32 = 1 << 26;
pub const FLAG_INVALID_COMMAND: u32 = 1 << 28;

/// Every bit that marks a failed configuration.
pub const ERROR_MASK: u32 = MASK_BSE_ERROR_CODE | FLAG_EXECUTION_FAIL | FLAG_INVALID_COMMAND;

const BSE_ERROR_SHIFT: u32 = 23;

/// Returns `true` when `status` reports a completed, error-free configuration.
#[must_use]
pub const fn configuration_ok(status: u32) -> bool {
    (status & FLAG_DONE) != 0 && (status & ERROR_MASK) == 0
}

/// Decoded BSE_ERROR_CODE values (0 means no error).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitstreamError {
    InvalidId,
    IllegalCommand,
    CrcMismatch,
    InvalidPreamble,
    UserAbort,
    DataOverflow,
    SramDataOverflow,
}

impl BitstreamError {
    /// Maps a raw 3-bit code; `0` and out-of-range values yield `None`.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0b001 => Some(Self::InvalidId),
            0b010 => Some(Self::IllegalCommand),
            0b011 => Some(Self::CrcMismatch),
            0b100 => Some(Self::InvalidPreamble),
            0b101 => Some(Self::UserAbort),
            0b110 => Some(Self::DataOverflow),
            0b111 => Some(Self::SramDataOverflow),
            _ => None,
        }
    }
}

impl fmt::Display for BitstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidId => "invalid-id",
            Self::IllegalCommand => "illegal-command",
            Self::CrcMismatch => "crc-mismatch",
            Self::InvalidPreamble => "invalid-preamble",
            Self::UserAbort => "user-abort",
            Self::DataOverflow => "data-overflow",
            Self::SramDataOverflow => "sram-data-overflow",
        };
        f.write_str(label)
    }
}

/// A single STATUS word as read from the FPGA. Never cached between queries.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusRegister(u32);

impl StatusRegister {
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn done(self) -> bool {
        self.0 & FLAG_DONE != 0
    }

    #[must_use]
    pub const fn busy(self) -> bool {
        self.0 & FLAG_BUSY != 0
    }

    #[must_use]
    pub const fn execution_fail(self) -> bool {
        self.0 & FLAG_EXECUTION_FAIL != 0
    }

    #[must_use]
    pub const fn invalid_command(self) -> bool {
        self.0 & FLAG_INVALID_COMMAND != 0
    }

    /// Raw 3-bit BSE_ERROR_CODE field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn bse_error_code(self) -> u8 {
        ((self.0 & MASK_BSE_ERROR_CODE) >> BSE_ERROR_SHIFT) as u8
    }

    #[must_use]
    pub const fn bitstream_error(self) -> Option<BitstreamError> {
        BitstreamError::from_code(self.bse_error_code())
    }

    /// DONE set and no error bits.
    #[must_use]
    pub const fn is_configuration_ok(self) -> bool {
        configuration_ok(self.0)
    }
}

impl fmt::Display for StatusRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08x} done={} busy={} exec_fail={} invalid_cmd={}",
            self.0,
            u8::from(self.done()),
            u8::from(self.busy()),
            u8::from(self.execution_fail()),
            u8::from(self.invalid_command()),
        )?;
        match self.bitstream_error() {
            Some(error) => write!(f, " bse={error}"),
            None => f.write_str(" bse=none"),
        }
    }
}

/// Errors from the bounded configuration check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusError {
    /// BUSY was still set after `polls` reads.
    BusyTimeout {
        polls: u32,
        last_status: StatusRegister,
    },
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusError::BusyTimeout { polls, last_status } => {
                write!(
                    f,
                    "FPGA still busy after {polls} polls (status 0x{:08x})",
                    last_status.bits()
                )
            }
        }
    }
}

/// Tunables for the BUSY poll loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusPollConfig {
    /// Busy-loop iterations between successive STATUS reads.
    pub spin_cycles: u32,
}

impl Default for StatusPollConfig {
    fn default() -> Self {
        Self {
            spin_cycles: STATUS_POLL_SPIN_CYCLES,
        }
    }
}

/// Performs one READ_STATUS transaction on an already-initialised TAP.
///
/// Strictly request/response: a misbehaving driver yields whatever word it
/// captured, there is no retry and no error path.
pub fn read_status_word<T: TapDriver + ?Sized>(tap: &mut T) -> u32 {
    let mut scratch = [0u8; 4];

    tap.go_to_state(TapState::ShiftIr);
    tap.shift(&[READ_STATUS], &mut scratch[..1], IR_LENGTH, true);
    tap.go_to_state(TapState::PauseIr);

    let mut captured = [0u8; 4];
    tap.go_to_state(TapState::ShiftDr);
    tap.shift(&[0u8; 4], &mut captured, STATUS_LENGTH, true);
    tap.go_to_state(TapState::PauseDr);

    u32::from_le_bytes(captured)
}

/// Issues STATUS reads through a TAP driver and evaluates the outcome.
pub struct StatusProtocol<T, D> {
    tap: T,
    delay: D,
    config: StatusPollConfig,
}

impl<T, D> StatusProtocol<T, D>
where
    T: TapDriver,
    D: BlockingDelay,
{
    #[must_use]
    pub fn new(tap: T, delay: D) -> Self {
        Self::with_config(tap, delay, StatusPollConfig::default())
    }

    #[must_use]
    pub const fn with_config(tap: T, delay: D, config: StatusPollConfig) -> Self {
        Self { tap, delay, config }
    }

    /// Reads the raw STATUS word. The caller must hold an initialised TAP;
    /// see [`Self::query_status`] for a self-contained read.
    pub fn read_status(&mut self) -> u32 {
        read_status_word(&mut self.tap)
    }

    /// Opens a TAP session, reads STATUS once, and closes the session.
    pub fn query_status(&mut self) -> StatusRegister {
        let mut session = TapSession::open(&mut self.tap);
        StatusRegister::from_bits(read_status_word(&mut *session))
    }

    /// Waits for configuration to finish and reports whether it succeeded.
    ///
    /// # Liveness
    ///
    /// This polls STATUS for as long as BUSY stays set, with no upper bound.
    /// An FPGA that never clears BUSY stalls the caller forever. Callers that
    /// need a guarantee should use [`Self::is_configuration_ok_within`].
    pub fn is_configuration_ok(&mut self) -> bool {
        match self.await_not_busy(None) {
            Ok(status) => status.is_configuration_ok(),
            // Unreachable without a poll limit.
            Err(StatusError::BusyTimeout { .. }) => false,
        }
    }

    /// Bounded variant of [`Self::is_configuration_ok`].
    ///
    /// Gives up after `max_polls` STATUS reads that all report BUSY. The TAP
    /// session is released on both paths.
    ///
    /// # Errors
    ///
    /// [`StatusError::BusyTimeout`] when BUSY never clears.
    pub fn is_configuration_ok_within(&mut self, max_polls: u32) -> Result<bool, StatusError> {
        self.await_not_busy(Some(max_polls))
            .map(StatusRegister::is_configuration_ok)
    }

    /// Reads STATUS until BUSY clears and returns the first idle word.
    ///
    /// `None` polls without limit. With `Some(limit)` the loop gives up after
    /// `limit` reads that all report BUSY.
    ///
    /// # Errors
    ///
    /// [`StatusError::BusyTimeout`] once the limit is reached.
    pub fn await_not_busy(
        &mut self,
        max_polls: Option<u32>,
    ) -> Result<StatusRegister, StatusError> {
        let spin_cycles = self.config.spin_cycles;
        let mut session = TapSession::open(&mut self.tap);
        let mut polls: u32 = 0;

        loop {
            let status = StatusRegister::from_bits(read_status_word(&mut *session));
            polls = polls.saturating_add(1);

            if !status.busy() {
                return Ok(status);
            }

            if let Some(limit) = max_polls
                && polls >= limit
            {
                return Err(StatusError::BusyTimeout {
                    polls,
                    last_status: status,
                });
            }

            self.delay.spin(spin_cycles);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_truth_table() {
        let cases: &[(u32, bool)] = &[
            (FLAG_DONE, true),
            (0, false),
            (FLAG_DONE | FLAG_EXECUTION_FAIL, false),
            (FLAG_DONE | (3 << 23), false),
            (FLAG_DONE | FLAG_INVALID_COMMAND, false),
            (FLAG_EXECUTION_FAIL, false),
            (FLAG_DONE | FLAG_BUSY, true),
            // Bits outside the error mask do not matter.
            (FLAG_DONE | (1 << 13) | (1 << 27) | (1 << 29), true),
            (u32::MAX, false),
        ];

        for &(status, expected) in cases {
            assert_eq!(configuration_ok(status), expected, "status 0x{status:08x}");
            assert_eq!(
                configuration_ok(status),
                status & (FLAG_DONE | ERROR_MASK) == FLAG_DONE
            );
        }
    }

    #[test]
    fn error_mask_matches_layout() {
        assert_eq!(ERROR_MASK, 0x1780_0000);
        assert_eq!(FLAG_DONE | FLAG_BUSY, 0x0000_1100);
    }

    #[test]
    fn bse_field_decodes() {
        let status = StatusRegister::from_bits(FLAG_DONE | (0b011 << 23));
        assert_eq!(status.bse_error_code(), 3);
        assert_eq!(status.bitstream_error(), Some(BitstreamError::CrcMismatch));
        assert!(!status.is_configuration_ok());

        assert_eq!(StatusRegister::from_bits(FLAG_DONE).bitstream_error(), None);
    }
}
