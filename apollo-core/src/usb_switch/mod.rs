//! Shared USB port: heartbeat reception and ownership arbitration.

pub mod advertisement;
pub mod arbiter;

pub use advertisement::{
    ADVERTISEMENT_LINK, ADVERTISEMENT_MARKER, AdvertisementReceiver, ByteDisposition, LinkFraming,
    Parity,
};
pub use arbiter::{
    ArbiterConfig, ButtonSample, OwnershipChange, PortArbiter, PortHardware, PortOwner,
    TransferReason,
};
