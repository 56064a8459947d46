//! USB device for the operator console.
//!
//! The MCU enumerates as a single CDC ACM interface whenever it owns the
//! shared port. The D+ pull-up is toggled by the port arbiter, so the device
//! simply reappears to the host after every take-over.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use crate::board;

pub const MAX_PACKET_SIZE: u16 = 64;

/// pid.codes test VID and the Apollo PID.
pub const USB_VID: u16 = 0x1d50;
pub const USB_PID: u16 = 0x615c;

#[cfg(target_os = "none")]
const CONTROL_BUFFER_LEN: usize = 64;
#[cfg(target_os = "none")]
const CONFIG_DESCRIPTOR_LEN: usize = 128;
#[cfg(target_os = "none")]
const BOS_DESCRIPTOR_LEN: usize = 32;

/// Strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Great Scott Gadgets",
            product: board::product_name(),
            serial_number: None,
        }
    }
}

/// Backing storage for the embassy USB builder and the CDC class.
#[cfg(target_os = "none")]
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    console_state: embassy_usb::class::cdc_acm::State<'static>,
}

#[cfg(target_os = "none")]
impl UsbDeviceStorage {
    pub fn new() -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            console_state: embassy_usb::class::cdc_acm::State::new(),
        }
    }
}

/// Split handles for the console interface.
#[cfg(target_os = "none")]
pub struct ConsolePort<D: embassy_usb::driver::Driver<'static>> {
    pub sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
    pub receiver: embassy_usb::class::cdc_acm::Receiver<'static, D>,
    pub control: embassy_usb::class::cdc_acm::ControlChanged<'static>,
}

/// Builds the device and its console interface.
#[cfg(target_os = "none")]
pub fn build<D>(
    driver: D,
    storage: &'static mut UsbDeviceStorage,
    strings: UsbDeviceStrings,
) -> (embassy_usb::UsbDevice<'static, D>, ConsolePort<D>)
where
    D: embassy_usb::driver::Driver<'static>,
{
    let mut config = embassy_usb::Config::new(USB_VID, USB_PID);
    config.manufacturer = Some(strings.manufacturer);
    config.product = Some(strings.product);
    config.serial_number = strings.serial_number;
    #[allow(clippy::cast_possible_truncation)]
    {
        config.max_packet_size_0 = MAX_PACKET_SIZE as u8;
    }
    config.max_power = 100;

    let mut builder = embassy_usb::Builder::new(
        driver,
        config,
        &mut storage.config_descriptor,
        &mut storage.bos_descriptor,
        &mut [],
        &mut storage.control_buf,
    );

    let class = embassy_usb::class::cdc_acm::CdcAcmClass::new(
        &mut builder,
        &mut storage.console_state,
        MAX_PACKET_SIZE,
    );
    let (sender, receiver, control) = class.split_with_control();

    (
        builder.build(),
        ConsolePort {
            sender,
            receiver,
            control,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_string_follows_board() {
        let strings = UsbDeviceStrings::default();
        assert_eq!(strings.product, board::product_name());
        assert!(strings.serial_number.is_none());
    }
}
