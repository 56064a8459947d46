use core::time::Duration;

use apollo_core::fpga::status::{
    FLAG_BUSY, FLAG_DONE, FLAG_EXECUTION_FAIL, IR_LENGTH, STATUS_LENGTH,
};
use apollo_core::fpga::{
    READ_STATUS, StatusError, StatusPollConfig, StatusProtocol, StatusRegister, TapDriver,
    TapState,
};
use apollo_core::timing::BlockingDelay;
use heapless::Vec as HeaplessVec;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TapOp {
    Init,
    Deinit,
    GoTo(TapState),
    Shift { first_tdi: u8, bits: usize, advance: bool },
}

/// TAP that replays a fixed list of STATUS words, repeating the last one.
struct ScriptedTap {
    script: &'static [u32],
    reads: usize,
    ops: HeaplessVec<TapOp, 256>,
    open: bool,
}

impl ScriptedTap {
    fn new(script: &'static [u32]) -> Self {
        Self {
            script,
            reads: 0,
            ops: HeaplessVec::new(),
            open: false,
        }
    }

    fn record(&mut self, op: TapOp) {
        self.ops.push(op).expect("tap log full");
    }
}

impl TapDriver for ScriptedTap {
    fn init(&mut self) {
        assert!(!self.open, "session opened twice");
        self.open = true;
        self.record(TapOp::Init);
    }

    fn deinit(&mut self) {
        assert!(self.open, "deinit without init");
        self.open = false;
        self.record(TapOp::Deinit);
    }

    fn go_to_state(&mut self, state: TapState) {
        self.record(TapOp::GoTo(state));
    }

    fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], bits: usize, advance_state: bool) {
        assert!(self.open, "shift outside a session");
        self.record(TapOp::Shift {
            first_tdi: tdi[0],
            bits,
            advance: advance_state,
        });

        if bits == STATUS_LENGTH {
            let index = self.reads.min(self.script.len() - 1);
            tdo.copy_from_slice(&self.script[index].to_le_bytes());
            self.reads += 1;
        }
    }
}

#[derive(Default)]
struct CountingDelay {
    spins: u32,
    spun_cycles: u64,
}

impl BlockingDelay for CountingDelay {
    fn delay(&mut self, _duration: Duration) {
        panic!("the STATUS poll loop must spin, not sleep");
    }

    fn spin(&mut self, cycles: u32) {
        self.spins += 1;
        self.spun_cycles += u64::from(cycles);
    }
}

const READ_SEQUENCE: [TapOp; 6] = [
    TapOp::GoTo(TapState::ShiftIr),
    TapOp::Shift {
        first_tdi: READ_STATUS,
        bits: IR_LENGTH,
        advance: true,
    },
    TapOp::GoTo(TapState::PauseIr),
    TapOp::GoTo(TapState::ShiftDr),
    TapOp::Shift {
        first_tdi: 0,
        bits: STATUS_LENGTH,
        advance: true,
    },
    TapOp::GoTo(TapState::PauseDr),
];

#[test]
fn query_status_brackets_one_read_in_a_session() {
    static SCRIPT: [u32; 1] = [FLAG_DONE];
    let mut tap = ScriptedTap::new(&SCRIPT);
    let mut delay = CountingDelay::default();

    let status = StatusProtocol::new(&mut tap, &mut delay).query_status();

    assert_eq!(status, StatusRegister::from_bits(FLAG_DONE));
    assert_eq!(tap.ops.first(), Some(&TapOp::Init));
    assert_eq!(&tap.ops[1..7], &READ_SEQUENCE);
    assert_eq!(tap.ops.last(), Some(&TapOp::Deinit));
    assert_eq!(tap.ops.len(), 8);
}

#[test]
fn read_status_leaves_session_management_to_the_caller() {
    static SCRIPT: [u32; 1] = [0x1234_5678];
    let mut tap = ScriptedTap::new(&SCRIPT);
    tap.init();

    let word = StatusProtocol::new(&mut tap, CountingDelay::default()).read_status();

    assert_eq!(word, 0x1234_5678);
    assert_eq!(&tap.ops[1..], &READ_SEQUENCE);
    assert!(tap.open);
}

#[test]
fn busy_is_polled_until_it_clears() {
    static SCRIPT: [u32; 4] = [FLAG_BUSY, FLAG_BUSY, FLAG_BUSY, FLAG_DONE];
    let mut tap = ScriptedTap::new(&SCRIPT);
    let mut delay = CountingDelay::default();
    let config = StatusPollConfig { spin_cycles: 250 };

    let ok = StatusProtocol::with_config(&mut tap, &mut delay, config).is_configuration_ok();

    assert!(ok);
    assert_eq!(tap.reads, 4);
    assert_eq!(delay.spins, 3);
    assert_eq!(delay.spun_cycles, 750);
    let inits = tap.ops.iter().filter(|op| **op == TapOp::Init).count();
    assert_eq!(inits, 1, "the whole wait runs inside one session");
    assert!(!tap.open);
}

#[test]
fn configuration_errors_fail_the_check() {
    static SCRIPT: [u32; 2] = [FLAG_BUSY, FLAG_DONE | FLAG_EXECUTION_FAIL];
    let mut tap = ScriptedTap::new(&SCRIPT);

    let ok = StatusProtocol::new(&mut tap, CountingDelay::default()).is_configuration_ok();

    assert!(!ok);
}

#[test]
fn missing_done_fails_the_check() {
    static SCRIPT: [u32; 1] = [0];
    let mut tap = ScriptedTap::new(&SCRIPT);

    assert!(!StatusProtocol::new(&mut tap, CountingDelay::default()).is_configuration_ok());
    assert_eq!(tap.reads, 1);
}

#[test]
fn bounded_check_times_out_and_closes_the_session() {
    static SCRIPT: [u32; 1] = [FLAG_BUSY];
    let mut tap = ScriptedTap::new(&SCRIPT);
    let mut delay = CountingDelay::default();

    let result = StatusProtocol::new(&mut tap, &mut delay).is_configuration_ok_within(5);

    assert_eq!(
        result,
        Err(StatusError::BusyTimeout {
            polls: 5,
            last_status: StatusRegister::from_bits(FLAG_BUSY),
        })
    );
    assert_eq!(tap.reads, 5);
    assert_eq!(delay.spins, 4);
    assert_eq!(tap.ops.last(), Some(&TapOp::Deinit));
    assert!(!tap.open);
}

#[test]
fn bounded_check_succeeds_inside_the_limit() {
    static SCRIPT: [u32; 2] = [FLAG_BUSY, FLAG_DONE];
    let mut tap = ScriptedTap::new(&SCRIPT);

    let result =
        StatusProtocol::new(&mut tap, CountingDelay::default()).is_configuration_ok_within(2);

    assert_eq!(result, Ok(true));
}
