use embassy_futures::join::join;
use embassy_futures::select::{Either, select};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Sender};
use embassy_usb::driver::EndpointError;
use heapless::Vec;

use super::{CONSOLE_REPLIES, CONSOLE_REQUESTS, USB_STORAGE};
use crate::console::{self, ConsoleSession, PROMPT, SessionEvent};
use crate::usb::{self, ConsolePort, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

const PACKET_LEN: usize = usb::MAX_PACKET_SIZE as usize;

/// Room for the echo of one packet: every byte may become a 3-byte erase.
type Echo = Vec<u8, { PACKET_LEN * 3 + 2 }>;

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let (mut device, port) = usb::build(driver, storage, UsbDeviceStrings::default());

    join(device.run(), run_console(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_console<D>(port: ConsolePort<D>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let ConsolePort {
        mut sender,
        mut receiver,
        control,
    } = port;
    let mut session = ConsoleSession::new();
    let mut ingress = [0u8; PACKET_LEN];

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &sender).await;
        session.reset();
        // A reply to a line sent before the last disconnect.
        let _ = CONSOLE_REPLIES.try_receive();

        defmt::info!("usb: console connected");
        if write_text(&mut sender, PROMPT.as_bytes()).await.is_err() {
            continue;
        }

        loop {
            match select(receiver.read_packet(&mut ingress), control.control_changed()).await {
                Either::First(Ok(count)) => {
                    match handle_packet(&ingress[..count], &mut session, &mut sender).await {
                        Ok(()) => {}
                        Err(EndpointError::Disabled) => {
                            defmt::warn!("usb: console write disabled");
                            break;
                        }
                        Err(_) => defmt::warn!("usb: console write error"),
                    }
                }
                Either::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console interface disabled");
                    break;
                }
                Either::First(Err(_)) => {
                    defmt::warn!("usb: console read error");
                }
                Either::Second(()) => {
                    if !sender.dtr() {
                        defmt::info!("usb: host dropped DTR");
                        break;
                    }
                }
            }
        }
    }
}

/// Runs one OUT packet through the line editor, executing completed lines.
async fn handle_packet<D>(
    bytes: &[u8],
    session: &mut ConsoleSession,
    sender: &mut Sender<'static, D>,
) -> Result<(), EndpointError>
where
    D: embassy_usb::driver::Driver<'static>,
{
    let mut echo = Echo::new();

    for &byte in bytes {
        match session.ingest(byte) {
            Ok(SessionEvent::Idle) => {}
            Ok(SessionEvent::Echo(value)) => {
                let _ = echo.push(value);
            }
            Ok(SessionEvent::Erase) => {
                let _ = echo.extend_from_slice(b"\x08 \x08");
            }
            Ok(SessionEvent::Line(line)) => {
                let _ = echo.extend_from_slice(b"\r\n");
                write_text(sender, &echo).await?;
                echo.clear();

                CONSOLE_REQUESTS.send(line).await;
                let reply = CONSOLE_REPLIES.receive().await;
                write_text(sender, reply.as_bytes()).await?;
            }
            Err(error) => {
                defmt::warn!("usb: {}", defmt::Display2Format(&error));
                write_text(sender, &echo).await?;
                echo.clear();
                write_text(sender, console::render_session_error(error).as_bytes()).await?;
            }
        }
    }

    write_text(sender, &echo).await
}

/// Writes `bytes` as full packets, ending with a short or zero-length one.
async fn write_text<D>(sender: &mut Sender<'static, D>, bytes: &[u8]) -> Result<(), EndpointError>
where
    D: embassy_usb::driver::Driver<'static>,
{
    if bytes.is_empty() {
        return Ok(());
    }

    for chunk in bytes.chunks(PACKET_LEN) {
        sender.write_packet(chunk).await?;
    }
    if bytes.len() % PACKET_LEN == 0 {
        sender.write_packet(&[]).await?;
    }
    Ok(())
}

async fn wait_for_dtr<D>(control: &ControlChanged<'static>, sender: &Sender<'static, D>)
where
    D: embassy_usb::driver::Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
