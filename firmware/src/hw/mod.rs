//! Embassy-backed implementations of the `apollo-core` hardware seams.

use core::time::Duration;

use apollo_core::fpga::ProgramLine;
use apollo_core::timing::{BlockingDelay, Monotonic, Tick};
use apollo_core::usb_switch::{ButtonSample, PortHardware, PortOwner};
use embassy_stm32::gpio::{Flex, Input, Level, Output, Pull, Speed};
use embassy_time::Instant;

mod jtag;

pub use jtag::BitBangJtag;

/// Millisecond counter derived from the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirmwareClock;

impl Monotonic for FirmwareClock {
    // Tick is a wrapping 32-bit counter; dropping the high bits is intended.
    #[allow(clippy::cast_possible_truncation)]
    fn now(&self) -> Tick {
        Tick::from_millis(Instant::now().as_millis() as u32)
    }
}

/// Busy-waits on the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyDelay;

impl BlockingDelay for EmbassyDelay {
    fn delay(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        embassy_time::block_for(embassy_time::Duration::from_micros(micros));
    }

    fn spin(&mut self, cycles: u32) {
        cortex_m::asm::delay(cycles);
    }
}

/// Open-drain style PROGRAM_N: driven low to hold the FPGA in reset, otherwise
/// an input with pull-up so the FPGA's own pull-up wins.
pub struct ProgramPin<'d> {
    pin: Flex<'d>,
}

impl<'d> ProgramPin<'d> {
    pub fn new(mut pin: Flex<'d>) -> Self {
        pin.set_as_input(Pull::Up);
        Self { pin }
    }
}

impl ProgramLine for ProgramPin<'_> {
    fn release(&mut self) {
        self.pin.set_as_input(Pull::Up);
    }

    fn drive_low(&mut self) {
        self.pin.set_low();
        self.pin.set_as_output(Speed::Low);
    }
}

/// The shared USB port: optional mux select, the ownership LED, and the
/// D+ pull-up that connects the MCU's own device controller.
pub struct UsbPort<'d> {
    switch: Option<Output<'d>>,
    indicator: Output<'d>,
}

impl<'d> UsbPort<'d> {
    pub fn new(switch: Option<Output<'d>>, indicator: Output<'d>) -> Self {
        Self { switch, indicator }
    }

    fn set_pullup(enabled: bool) {
        embassy_stm32::pac::USB.bcdr().modify(|w| w.set_dppu(enabled));
    }
}

impl PortHardware for UsbPort<'_> {
    fn disconnect(&mut self) {
        Self::set_pullup(false);
    }

    fn connect(&mut self) {
        Self::set_pullup(true);
    }

    fn route_to(&mut self, owner: PortOwner) {
        if let Some(switch) = self.switch.as_mut() {
            // Low selects the FPGA side of the mux.
            switch.set_level(Level::from(owner == PortOwner::Microcontroller));
        }
    }

    fn set_indicator(&mut self, lit: bool) {
        self.indicator.set_level(Level::from(lit));
    }
}

/// Active-low request button, absent on boards that share it with an LED.
pub struct RequestButton<'d> {
    pin: Option<Input<'d>>,
}

impl<'d> RequestButton<'d> {
    pub fn new(pin: Option<Input<'d>>) -> Self {
        Self { pin }
    }

    pub fn sample(&self) -> ButtonSample {
        self.pin
            .as_ref()
            .map_or(ButtonSample::Unsupported, |pin| {
                ButtonSample::from_active_low(pin.is_high())
            })
    }
}
