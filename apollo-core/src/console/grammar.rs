//! Line parser for the operator console.
//!
//! Commands are short, whitespace separated and case-insensitive. The verb is
//! looked up in the [`Topic`] catalogue first so a malformed argument list can
//! be answered with that command's usage line.

use heapless::Vec;
use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::{Caseless, dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded};
use winnow::error::{ContextError, ErrMode};
use winnow::stream::Stream;
use winnow::token::take_while;

use super::ConsoleError;
use super::catalog::Topic;
use crate::debug_spi::MAX_TRANSFER;

/// Bytes queued by `spi send`.
pub type SpiPayload = Vec<u8, MAX_TRANSFER>;

/// Structured console commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Help(Option<Topic>),
    Log,
    Fpga(FpgaCommand),
    Usb(UsbCommand),
    SpiSend(SpiPayload),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpgaCommand {
    /// Pulse PROGRAM.
    Reconfigure,
    /// Hold PROGRAM low.
    Offline,
    /// Release PROGRAM without pulsing it.
    Release,
    /// One raw STATUS read.
    Status,
    /// Wait for BUSY to clear and evaluate the configuration result.
    Check { polls: Option<u32> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbCommand {
    Take,
    HandOff,
    Honor,
    Owner,
}

enum Parsed {
    Command(ConsoleCommand),
    Oversized,
}

/// Parses one console line. Surrounding whitespace and line endings are ignored.
///
/// # Errors
///
/// [`ConsoleError::Empty`] for a blank line, [`ConsoleError::UnknownCommand`]
/// for an unknown verb, [`ConsoleError::PayloadTooLong`] for an oversized SPI
/// payload and [`ConsoleError::Usage`] for anything else.
pub fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ConsoleError::Empty);
    }

    let mut input = line;
    let topic = word
        .verify_map(Topic::find)
        .parse_next(&mut input)
        .map_err(|_| ConsoleError::UnknownCommand)?;

    let arguments = match topic {
        Topic::Status => Ok(Parsed::Command(ConsoleCommand::Status)),
        Topic::Log => Ok(Parsed::Command(ConsoleCommand::Log)),
        Topic::Help => {
            help_topic(&mut input).map(|topic| Parsed::Command(ConsoleCommand::Help(topic)))
        }
        Topic::Fpga => {
            fpga_command(&mut input).map(|command| Parsed::Command(ConsoleCommand::Fpga(command)))
        }
        Topic::Usb => {
            usb_command(&mut input).map(|command| Parsed::Command(ConsoleCommand::Usb(command)))
        }
        Topic::Spi => spi_send(&mut input).map(|payload| match payload {
            Some(payload) => Parsed::Command(ConsoleCommand::SpiSend(payload)),
            None => Parsed::Oversized,
        }),
    };

    let parsed = arguments
        .and_then(|parsed| end_of_line(&mut input).map(|()| parsed))
        .map_err(|_| ConsoleError::Usage(topic))?;

    match parsed {
        Parsed::Command(command) => Ok(command),
        Parsed::Oversized => Err(ConsoleError::PayloadTooLong),
    }
}

fn word<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_').parse_next(input)
}

fn end_of_line(input: &mut &str) -> ModalResult<()> {
    (space0, eof).void().parse_next(input)
}

fn help_topic(input: &mut &str) -> ModalResult<Option<Topic>> {
    opt(preceded(space1, word.verify_map(Topic::find))).parse_next(input)
}

fn fpga_command(input: &mut &str) -> ModalResult<FpgaCommand> {
    preceded(
        space1,
        alt((
            Caseless("reconfigure").value(FpgaCommand::Reconfigure),
            Caseless("offline").value(FpgaCommand::Offline),
            Caseless("release").value(FpgaCommand::Release),
            Caseless("status").value(FpgaCommand::Status),
            preceded(Caseless("check"), opt(poll_limit))
                .map(|polls| FpgaCommand::Check { polls }),
        )),
    )
    .parse_next(input)
}

fn poll_limit(input: &mut &str) -> ModalResult<u32> {
    preceded(
        (space1, Caseless("polls"), space0, '=', space0),
        dec_uint.verify(|polls: &u32| *polls > 0),
    )
    .parse_next(input)
}

fn usb_command(input: &mut &str) -> ModalResult<UsbCommand> {
    preceded(
        space1,
        alt((
            Caseless("take").value(UsbCommand::Take),
            Caseless("handoff").value(UsbCommand::HandOff),
            Caseless("honor").value(UsbCommand::Honor),
            Caseless("owner").value(UsbCommand::Owner),
        )),
    )
    .parse_next(input)
}

/// `send` followed by one or more hex bytes; `None` when they do not fit.
fn spi_send(input: &mut &str) -> ModalResult<Option<SpiPayload>> {
    (space1, Caseless("send")).void().parse_next(input)?;

    let mut payload = SpiPayload::new();
    let mut oversized = false;
    loop {
        let checkpoint = input.checkpoint();
        match preceded(space1, hex_byte).parse_next(input) {
            Ok(byte) => oversized |= payload.push(byte).is_err(),
            Err(ErrMode::Backtrack(_)) => {
                input.reset(&checkpoint);
                break;
            }
            Err(error) => return Err(error),
        }
    }

    if payload.is_empty() {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }

    Ok((!oversized).then_some(payload))
}

fn hex_byte(input: &mut &str) -> ModalResult<u8> {
    preceded(
        opt(Caseless("0x")),
        take_while(1..=2, |c: char| c.is_ascii_hexdigit()),
    )
    .verify_map(|digits: &str| u8::from_str_radix(digits, 16).ok())
    .parse_next(input)
}
