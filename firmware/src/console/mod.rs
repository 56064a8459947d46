#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Operator console plumbing for the CDC ACM interface.
//!
//! [`ConsoleSession`] assembles host bytes into lines and produces the echo
//! the terminal expects. Complete lines travel to the control task over
//! [`ConsoleRequests`]; the rendered reply comes back over [`ConsoleReplies`].
//! Parsing and execution live in `apollo_core::console`.

use core::fmt::{self, Write as _};
use core::str;

use apollo_core::console::{ConsoleError, Reply};
use embassy_sync::channel::Channel;
use heapless::{String, Vec};

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
type ConsoleMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ConsoleMutex = NoopRawMutex;

/// Longest accepted command line, terminator excluded.
pub const MAX_LINE_LEN: usize = 96;

/// Largest rendered reply, prompt included.
pub const MAX_REPLY_LEN: usize = 1024;

pub const PROMPT: &str = "apollo> ";

const TRUNCATED: &str = "...";
const REPLY_TAIL: usize = TRUNCATED.len() + 2 + PROMPT.len();

pub type ConsoleLine = String<MAX_LINE_LEN>;
pub type ReplyText = String<MAX_REPLY_LEN>;

pub type ConsoleRequests = Channel<ConsoleMutex, ConsoleLine, 1>;
pub type ConsoleReplies = Channel<ConsoleMutex, ReplyText, 1>;

/// Line assembly failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionError {
    /// The line grew past [`MAX_LINE_LEN`]; it is discarded up to the next
    /// terminator.
    LineOverflow,
    InvalidUtf8,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::LineOverflow => write!(f, "line longer than {MAX_LINE_LEN} bytes"),
            SessionError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
        }
    }
}

/// What the caller should do after feeding one byte.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    /// Nothing to send back.
    Idle,
    /// Echo this byte.
    Echo(u8),
    /// Erase the last echoed character.
    Erase,
    /// A complete line is ready for execution.
    Line(ConsoleLine),
}

/// Line editor for one CDC connection.
pub struct ConsoleSession {
    buffer: Vec<u8, MAX_LINE_LEN>,
    discarding: bool,
    last_was_cr: bool,
}

impl ConsoleSession {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
            last_was_cr: false,
        }
    }

    /// Drops any partial line (host connected or disconnected).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
        self.last_was_cr = false;
    }

    /// Feeds one byte from the host.
    pub fn ingest(&mut self, byte: u8) -> Result<SessionEvent, SessionError> {
        let after_cr = core::mem::replace(&mut self.last_was_cr, byte == b'\r');

        match byte {
            // `\r\n` ends one line, not two.
            b'\n' if after_cr => Ok(SessionEvent::Idle),
            b'\r' | b'\n' => self.finish_line(),
            0x08 | 0x7f => Ok(match self.buffer.pop() {
                Some(_) if !self.discarding => SessionEvent::Erase,
                _ => SessionEvent::Idle,
            }),
            _ if self.discarding => Ok(SessionEvent::Idle),
            value if value.is_ascii_control() => Ok(SessionEvent::Idle),
            value => {
                if self.buffer.push(value).is_err() {
                    self.buffer.clear();
                    self.discarding = true;
                    return Err(SessionError::LineOverflow);
                }
                Ok(SessionEvent::Echo(value))
            }
        }
    }

    fn finish_line(&mut self) -> Result<SessionEvent, SessionError> {
        let discarded = core::mem::replace(&mut self.discarding, false);
        let bytes = core::mem::take(&mut self.buffer);
        if discarded {
            return Ok(SessionEvent::Idle);
        }

        let text = str::from_utf8(&bytes).map_err(|_| SessionError::InvalidUtf8)?;
        let mut line = ConsoleLine::new();
        // Same capacity as the byte buffer, so this cannot fail.
        let _ = line.push_str(text);
        Ok(SessionEvent::Line(line))
    }
}

impl Default for ConsoleSession {
    fn default() -> Self {
        Self::new()
    }
}

/// `fmt::Write` adapter that expands `\n` to `\r\n` and stops at `limit`.
struct TerminalWriter<'a> {
    out: &'a mut ReplyText,
    limit: usize,
    truncated: bool,
}

impl fmt::Write for TerminalWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            let needed = ch.len_utf8() + usize::from(ch == '\n');
            if self.out.len() + needed > self.limit {
                self.truncated = true;
                return Err(fmt::Error);
            }
            if ch == '\n' {
                self.out.push('\r').map_err(|_| fmt::Error)?;
            }
            self.out.push(ch).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

/// Renders a console result as terminal text followed by a fresh prompt.
///
/// Errors become `ERR <reason>`; blank lines produce only the prompt.
pub fn render(result: &Result<Reply, ConsoleError>) -> ReplyText {
    let mut text = ReplyText::new();
    let truncated = {
        let mut writer = TerminalWriter {
            out: &mut text,
            limit: MAX_REPLY_LEN - REPLY_TAIL,
            truncated: false,
        };
        let _ = match result {
            Ok(reply) => writeln!(writer, "{reply}"),
            Err(ConsoleError::Empty) => Ok(()),
            Err(error) => writeln!(writer, "ERR {error}"),
        };
        writer.truncated
    };

    // REPLY_TAIL keeps room for the suffix.
    if truncated {
        let _ = text.push_str(TRUNCATED);
        let _ = text.push_str("\r\n");
    }
    let _ = text.push_str(PROMPT);
    text
}

/// Renders a line-assembly failure the same way as a command error.
pub fn render_session_error(error: SessionError) -> ReplyText {
    let mut text = ReplyText::new();
    let _ = write!(text, "\r\nERR {error}\r\n{PROMPT}");
    text
}
