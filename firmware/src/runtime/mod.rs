use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Flex, Input, Level, Output, Pull, Speed};
use embassy_sync::channel::Channel;
use static_cell::StaticCell;

use apollo_core::control::{ControlHardware, ControlPlane};
use apollo_core::usb_switch::AdvertisementReceiver;

use crate::board::BOARD;
use crate::console::{ConsoleReplies, ConsoleRequests};
use crate::hw::{BitBangJtag, EmbassyDelay, ProgramPin, RequestButton, UsbPort};
use crate::usb;

mod adv_task;
mod control_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type FirmwarePlane = ControlPlane<
    'static,
    UsbPort<'static>,
    ProgramPin<'static>,
    BitBangJtag<'static>,
    EmbassyDelay,
>;

pub(super) static HEARTBEAT: AdvertisementReceiver = AdvertisementReceiver::new();
pub(super) static CONSOLE_REQUESTS: ConsoleRequests = Channel::new();
pub(super) static CONSOLE_REPLIES: ConsoleReplies = Channel::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let mut config = hal::Config::default();
    {
        use hal::rcc::{Hsi48Config, mux};
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: true,
        });
        config.rcc.mux.usbsel = mux::Usbsel::HSI48;
    }

    let hal::Peripherals {
        PA5,
        PA8,
        PA11,
        PA12,
        PB1,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        PC13,
        USB,
        USART5,
        DMA1_CH1,
        ..
    } = hal::init(config);

    defmt::info!(
        "apollo: {} r{}.{}",
        BOARD.family.label(),
        BOARD.revision.major,
        BOARD.revision.minor
    );

    let capabilities = BOARD.capabilities;
    let switch = capabilities
        .has_usb_switch
        .then(|| Output::new(PB7, Level::Low, Speed::Low));
    let button = capabilities
        .has_program_button
        .then(|| Input::new(PC13, Pull::Up));

    let hardware = ControlHardware {
        port: UsbPort::new(switch, Output::new(PA5, Level::Low, Speed::Low)),
        program: ProgramPin::new(Flex::new(PA8)),
        tap: BitBangJtag::new(
            Flex::new(PB3),
            Flex::new(PB6),
            Flex::new(PB5),
            Input::new(PB4, Pull::None),
        ),
    };
    let plane: FirmwarePlane = ControlPlane::new(BOARD, &HEARTBEAT, hardware, EmbassyDelay);

    // The USB stack enables the D+ pull-up when it starts; the control task's
    // initial routing must run after that to be the one that sticks.
    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    spawner
        .spawn(adv_task::run(USART5, PB1, DMA1_CH1))
        .expect("failed to spawn advertisement task");

    spawner
        .spawn(control_task::run(plane, RequestButton::new(button)))
        .expect("failed to spawn control task");

    core::future::pending::<()>().await;
}
