mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use apollo_core::board::BoardConfig;
use apollo_core::usb_switch::AdvertisementReceiver;

use session::{SIM_USAGE, Session, board_from_tag};

const USAGE: &str =
    "Usage: apollo-emulator [--board <cynthion|cynthion-r0.5|urti|luna-d21>] [--transcript <path>]";

struct Options {
    board: BoardConfig,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let heartbeat = AdvertisementReceiver::new();
    let mut session = Session::new(options.board, &heartbeat);
    if let Some(path) = options.transcript.as_deref() {
        session = session.with_transcript(path)?;
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Apollo emulator ready. Type `help` for console commands, `exit` to quit."
    )?;
    writeln!(writer, "Simulation: {SIM_USAGE}")?;
    for event in session.drain_events() {
        writeln!(writer, "{event}")?;
    }

    loop {
        line.clear();
        write!(writer, "apollo> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        board: board_from_tag("cynthion")?,
        transcript: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--board=") {
            options.board = board_from_tag(value)?;
        } else if arg == "--board" {
            let value = args.next().ok_or("Expected value after --board")?;
            options.board = board_from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--transcript=") {
            options.transcript = Some(PathBuf::from(value));
        } else if arg == "--transcript" {
            let value = args.next().ok_or("Expected value after --transcript")?;
            options.transcript = Some(PathBuf::from(value));
        } else {
            return Err(format!("Unexpected argument `{arg}`"));
        }
    }

    Ok(options)
}
