//! Bit-banged JTAG master on four GPIOs.

use apollo_core::fpga::{TapDriver, TapState, tms_path};
use embassy_stm32::gpio::{Flex, Input, Level, Pull, Speed};

/// CPU cycles per half TCK period (about 1 MHz at 64 MHz SYSCLK).
const HALF_PERIOD_CYCLES: u32 = 32;

/// Drives TCK/TMS/TDI and samples TDO on the rising edge.
///
/// Between sessions the outputs float so other JTAG masters on the header can
/// drive the FPGA.
pub struct BitBangJtag<'d> {
    tck: Flex<'d>,
    tms: Flex<'d>,
    tdi: Flex<'d>,
    tdo: Input<'d>,
    state: TapState,
}

impl<'d> BitBangJtag<'d> {
    pub fn new(tck: Flex<'d>, tms: Flex<'d>, tdi: Flex<'d>, tdo: Input<'d>) -> Self {
        let mut jtag = Self {
            tck,
            tms,
            tdi,
            tdo,
            state: TapState::TestLogicReset,
        };
        jtag.release_pins();
        jtag
    }

    fn release_pins(&mut self) {
        self.tck.set_as_input(Pull::None);
        self.tms.set_as_input(Pull::None);
        self.tdi.set_as_input(Pull::None);
    }

    fn clock(&mut self, tms: bool, tdi: bool) -> bool {
        self.tms.set_level(Level::from(tms));
        self.tdi.set_level(Level::from(tdi));
        cortex_m::asm::delay(HALF_PERIOD_CYCLES);

        self.tck.set_high();
        let tdo = self.tdo.is_high();
        cortex_m::asm::delay(HALF_PERIOD_CYCLES);
        self.tck.set_low();

        self.state = self.state.next(tms);
        tdo
    }
}

impl TapDriver for BitBangJtag<'_> {
    fn init(&mut self) {
        self.tck.set_low();
        self.tms.set_high();
        self.tdi.set_low();
        for pin in [&mut self.tck, &mut self.tms, &mut self.tdi] {
            pin.set_as_output(Speed::VeryHigh);
        }

        for _ in 0..5 {
            self.clock(true, false);
        }
        self.state = TapState::TestLogicReset;
    }

    fn deinit(&mut self) {
        self.release_pins();
    }

    fn go_to_state(&mut self, state: TapState) {
        for tms in tms_path(self.state, state) {
            self.clock(tms, false);
        }
    }

    fn shift(&mut self, tdi: &[u8], tdo: &mut [u8], bits: usize, advance_state: bool) {
        for byte in tdo.iter_mut().take(bits.div_ceil(8)) {
            *byte = 0;
        }

        for bit in 0..bits {
            let (index, offset) = (bit / 8, bit % 8);
            let out = tdi.get(index).is_some_and(|byte| byte & (1 << offset) != 0);
            let last = advance_state && bit + 1 == bits;

            if self.clock(last, out)
                && let Some(byte) = tdo.get_mut(index)
            {
                *byte |= 1 << offset;
            }
        }
    }
}
