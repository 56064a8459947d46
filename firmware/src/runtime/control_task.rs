use apollo_core::console::run_line;
use apollo_core::telemetry::EventId;
use apollo_core::timing::Monotonic;
use defmt::Display2Format;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Ticker};

use super::{CONSOLE_REPLIES, CONSOLE_REQUESTS, FirmwarePlane};
use crate::console;
use crate::hw::{FirmwareClock, RequestButton};
use crate::link_stats;

/// Arbiter poll interval; well inside the heartbeat timeout.
const POLL_PERIOD: Duration = Duration::from_millis(10);

/// Sole owner of the control plane: periodic arbitration plus console
/// requests, one at a time.
#[embassy_executor::task]
pub async fn run(mut plane: FirmwarePlane, button: RequestButton<'static>) -> ! {
    let clock = FirmwareClock;
    let mut ticker = Ticker::every(POLL_PERIOD);

    plane.start(clock.now());
    let mut next_event = mirror_events(&plane, 0);
    let mut link = link_stats::snapshot();

    loop {
        match select(ticker.next(), CONSOLE_REQUESTS.receive()).await {
            Either::First(()) => {
                plane.poll(button.sample(), clock.now());
            }
            Either::Second(line) => {
                let result = run_line(&mut plane, &line, clock.now());
                CONSOLE_REPLIES.send(console::render(&result)).await;
            }
        }

        next_event = mirror_events(&plane, next_event);

        let stats = link_stats::snapshot();
        let parity_errors = stats.new_parity_errors(&link);
        if parity_errors > 0 {
            defmt::warn!(
                "adv: {} parity error(s), {} total",
                parity_errors,
                stats.parity_errors
            );
        }
        link = stats;
    }
}

/// Logs every record at or after `next`; returns the next unseen id.
fn mirror_events(plane: &FirmwarePlane, next: EventId) -> EventId {
    let mut next = next;
    for record in plane.events().oldest_first() {
        if record.id >= next {
            defmt::info!("event {}", Display2Format(record));
            next = record.id.wrapping_add(1);
        }
    }
    next
}
