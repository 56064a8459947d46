//! Command catalogue shared by the parser and the `help` command.

/// Top-level console commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Status,
    Help,
    Log,
    Fpga,
    Usb,
    Spi,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Status,
        Topic::Log,
        Topic::Fpga,
        Topic::Usb,
        Topic::Spi,
        Topic::Help,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Topic::Status => "status",
            Topic::Help => "help",
            Topic::Log => "log",
            Topic::Fpga => "fpga",
            Topic::Usb => "usb",
            Topic::Spi => "spi",
        }
    }

    #[must_use]
    pub const fn usage(self) -> &'static str {
        match self {
            Topic::Status => "status",
            Topic::Help => "help [command]",
            Topic::Log => "log",
            Topic::Fpga => "fpga reconfigure|offline|release|status|check [polls=<n>]",
            Topic::Usb => "usb take|handoff|honor|owner",
            Topic::Spi => "spi send <hex bytes>",
        }
    }

    #[must_use]
    pub const fn summary(self) -> &'static str {
        match self {
            Topic::Status => "board, port owner, heartbeat and PROGRAM state",
            Topic::Help => "list commands or show one command's usage",
            Topic::Log => "recent ownership and configuration events",
            Topic::Fpga => "drive PROGRAM or read the configuration STATUS register",
            Topic::Usb => "move the shared USB port between Apollo and the FPGA",
            Topic::Spi => "send bytes over the debug SPI link",
        }
    }

    /// Case-insensitive lookup by command name.
    #[must_use]
    pub fn find(name: &str) -> Option<Topic> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.name().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(Topic::find("FPGA"), Some(Topic::Fpga));
        assert_eq!(Topic::find("Usb"), Some(Topic::Usb));
        assert_eq!(Topic::find("reboot"), None);
    }

    #[test]
    fn usage_starts_with_name() {
        for topic in Topic::ALL {
            assert!(topic.usage().starts_with(topic.name()));
        }
    }
}
