//! Operator console shared by the firmware CDC interface and the emulator.

pub mod catalog;
pub mod commands;
pub mod grammar;

use core::fmt;

use crate::debug_spi::{DebugSpiError, MAX_TRANSFER};
use crate::fpga::StatusError;

pub use catalog::Topic;
pub use commands::{
    ConsoleBackend, DEFAULT_CHECK_POLLS, LOG_REPLY_LEN, RecentEvents, Reply, SystemSnapshot,
    execute, run_line,
};
pub use grammar::{ConsoleCommand, FpgaCommand, SpiPayload, UsbCommand, parse};

/// Everything a console line can fail with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// Blank line; front-ends normally just re-prompt.
    Empty,
    UnknownCommand,
    /// The verb was recognised but its arguments were not.
    Usage(Topic),
    PayloadTooLong,
    Status(StatusError),
    Spi(DebugSpiError),
}

impl From<StatusError> for ConsoleError {
    fn from(error: StatusError) -> Self {
        Self::Status(error)
    }
}

impl From<DebugSpiError> for ConsoleError {
    fn from(error: DebugSpiError) -> Self {
        Self::Spi(error)
    }
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Empty => f.write_str("empty command"),
            ConsoleError::UnknownCommand => f.write_str("unknown command (try `help`)"),
            ConsoleError::Usage(topic) => write!(f, "usage: {}", topic.usage()),
            ConsoleError::PayloadTooLong => {
                write!(f, "payload longer than {MAX_TRANSFER} bytes")
            }
            ConsoleError::Status(error) => error.fmt(f),
            ConsoleError::Spi(error) => error.fmt(f),
        }
    }
}
