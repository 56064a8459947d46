//! Board families and the capability flags each revision exposes.
//!
//! The arbiter and button handling do not change shape between boards; a
//! [`Capabilities`] value only decides which transitions are reachable. The
//! firmware resolves one [`BoardConfig`] at build time and hands its
//! capabilities to everything that needs them.

use core::fmt;

/// Hardware features that select the arbiter variant.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Capabilities {
    /// A user request button wired to its own pin (not shared with an LED).
    pub has_program_button: bool,
    /// A physical mux that can route the shared USB port to the FPGA.
    pub has_usb_switch: bool,
}

impl Capabilities {
    /// Board with neither a dedicated button nor a USB switch.
    pub const NONE: Self = Self {
        has_program_button: false,
        has_usb_switch: false,
    };

    /// Board with both a dedicated button and a USB switch.
    pub const FULL: Self = Self {
        has_program_button: true,
        has_usb_switch: true,
    };
}

/// Board family the firmware was built for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BoardFamily {
    /// SAMD11-based LUNA / Cynthion boards.
    Cynthion,
    /// SAMD21-based LUNA boards (dedicated Apollo USB port, no switch).
    LunaD21,
    /// URTI boards.
    Urti,
}

impl BoardFamily {
    /// Short label used in status output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            BoardFamily::Cynthion => "cynthion",
            BoardFamily::LunaD21 => "luna-d21",
            BoardFamily::Urti => "urti",
        }
    }
}

/// Board hardware revision (`rMAJOR.MINOR`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct BoardRevision {
    pub major: u8,
    pub minor: u8,
}

impl BoardRevision {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for BoardRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}.{}", self.major, self.minor)
    }
}

/// Resolved board description: family, revision, and derived capabilities.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoardConfig {
    pub family: BoardFamily,
    pub revision: BoardRevision,
    pub capabilities: Capabilities,
}

impl BoardConfig {
    /// Describes `family` at `revision`, deriving its capabilities.
    #[must_use]
    pub const fn new(family: BoardFamily, revision: BoardRevision) -> Self {
        Self {
            family,
            revision,
            capabilities: capabilities_for(family, revision),
        }
    }
}

/// Capability rule per family.
///
/// Cynthion r0.3 through r0.5 do have a button, but its pin is shared with
/// LED A and those revisions give Apollo a dedicated USB port. The button is
/// reported as absent there rather than disambiguated from the LED.
#[must_use]
pub const fn capabilities_for(family: BoardFamily, revision: BoardRevision) -> Capabilities {
    match family {
        BoardFamily::Cynthion => {
            let switched = (revision.major == 0 && revision.minor >= 6) || revision.major == 1;
            if switched {
                Capabilities::FULL
            } else {
                Capabilities::NONE
            }
        }
        BoardFamily::LunaD21 => Capabilities::NONE,
        BoardFamily::Urti => Capabilities::FULL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cynthion_switch_arrives_in_r0_6() {
        for minor in 3..6 {
            let caps = capabilities_for(BoardFamily::Cynthion, BoardRevision::new(0, minor));
            assert_eq!(caps, Capabilities::NONE, "r0.{minor}");
        }

        let caps = capabilities_for(BoardFamily::Cynthion, BoardRevision::new(0, 6));
        assert_eq!(caps, Capabilities::FULL);

        let caps = capabilities_for(BoardFamily::Cynthion, BoardRevision::new(1, 4));
        assert_eq!(caps, Capabilities::FULL);
    }

    #[test]
    fn family_defaults() {
        let d21 = BoardConfig::new(BoardFamily::LunaD21, BoardRevision::new(0, 2));
        assert!(!d21.capabilities.has_usb_switch);
        assert!(!d21.capabilities.has_program_button);

        let urti = BoardConfig::new(BoardFamily::Urti, BoardRevision::new(0, 1));
        assert!(urti.capabilities.has_usb_switch);
        assert!(urti.capabilities.has_program_button);
    }
}
