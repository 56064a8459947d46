use apollo_core::timing::Monotonic;
use apollo_core::usb_switch::ADVERTISEMENT_LINK;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{Config as UartConfig, DataBits, Error, Parity, StopBits, UartRx};

use super::HEARTBEAT;
use crate::hw::FirmwareClock;
use crate::link_stats;

embassy_stm32::bind_interrupts!(struct AdvIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::InterruptHandler<hal::peripherals::USART5>;
});

/// Feeds every byte on the advertisement line into [`HEARTBEAT`].
#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART5>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
    rx_dma: Peri<'static, hal::peripherals::DMA1_CH1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = ADVERTISEMENT_LINK.baud_rate;
    // The peripheral widens the frame to nine bits for the parity bit.
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityEven;

    let mut rx = UartRx::new(usart, AdvIrqs, rx_pin, rx_dma, config)
        .expect("failed to initialize advertisement UART");
    let clock = FirmwareClock;
    let mut byte = [0u8; 1];

    loop {
        let parity_error = match rx.read(&mut byte).await {
            Ok(()) => false,
            Err(Error::Parity) => true,
            Err(_) => {
                defmt::warn!("adv: receive error, byte dropped");
                continue;
            }
        };

        let disposition = HEARTBEAT.on_byte(byte[0], parity_error, clock.now());
        link_stats::record(disposition);
    }
}
