//! Debug SPI link to the FPGA.
//!
//! The transport is not wired up on any supported board. Both request
//! handlers report failure so callers treat the capability as unavailable.

use core::fmt;

/// Largest payload accepted in one request.
pub const MAX_TRANSFER: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DebugSpiError {
    /// The debug SPI transport does not exist on this board.
    Unimplemented,
}

impl fmt::Display for DebugSpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugSpiError::Unimplemented => f.write_str("debug SPI is not available"),
        }
    }
}

/// Request handlers for the debug SPI vendor requests.
#[derive(Debug, Default)]
pub struct DebugSpi {
    rejected: u32,
}

impl DebugSpi {
    #[must_use]
    pub const fn new() -> Self {
        Self { rejected: 0 }
    }

    /// Starts a transfer of `payload`.
    ///
    /// # Errors
    ///
    /// Always [`DebugSpiError::Unimplemented`].
    pub fn send(&mut self, payload: &[u8]) -> Result<(), DebugSpiError> {
        let _ = payload;
        self.reject()
    }

    /// Completion stage of a transfer.
    ///
    /// # Errors
    ///
    /// Always [`DebugSpiError::Unimplemented`].
    pub fn send_complete(&mut self) -> Result<(), DebugSpiError> {
        self.reject()
    }

    /// Number of requests turned away so far.
    #[must_use]
    pub const fn rejected(&self) -> u32 {
        self.rejected
    }

    fn reject(&mut self) -> Result<(), DebugSpiError> {
        self.rejected = self.rejected.saturating_add(1);
        Err(DebugSpiError::Unimplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_fails() {
        let mut spi = DebugSpi::new();

        assert_eq!(spi.send(&[0x9f, 0x00]), Err(DebugSpiError::Unimplemented));
        assert_eq!(spi.send(&[]), Err(DebugSpiError::Unimplemented));
        assert_eq!(spi.send_complete(), Err(DebugSpiError::Unimplemented));
        assert_eq!(spi.rejected(), 3);
    }
}
