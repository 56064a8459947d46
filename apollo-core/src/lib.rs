#![no_std]

// Shared logic for the Apollo FPGA supervisor.
//
// Everything here stays `no_std` so the same state machines run inside the MCU
// firmware and the host emulator. Hardware access goes through the traits each
// module defines; the crate never touches registers itself.

pub mod board;
pub mod console;
pub mod control;
pub mod debug_spi;
pub mod fpga;
pub mod telemetry;
pub mod timing;
pub mod usb_switch;
