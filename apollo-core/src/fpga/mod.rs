//! FPGA configuration control: the PROGRAM line and the JTAG STATUS readout.

pub mod jtag;
pub mod program;
pub mod status;

pub use jtag::{TapDriver, TapState, tms_path};
pub use program::{ProgramLine, ProgramState, ReconfigurationController};
pub use status::{
    BitstreamError, READ_STATUS, StatusError, StatusPollConfig, StatusProtocol, StatusRegister,
};
