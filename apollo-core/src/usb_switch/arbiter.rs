//! Ownership arbiter for the USB port shared between Apollo and the FPGA.
//!
//! Three inputs move the port: the user request button, loss of the FPGA
//! heartbeat, and an explicit request to honour a live heartbeat again. The
//! arbiter is owned by a single polling task; nothing here runs in interrupt
//! context and every transition to the current owner is a silent no-op.

use core::fmt;
use core::time::Duration;

use super::advertisement::AdvertisementReceiver;
use crate::board::Capabilities;
use crate::timing::{BlockingDelay, HEARTBEAT_TIMEOUT, Tick, USB_SETTLE_DELAY};

/// Which controller drives the shared USB data lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortOwner {
    Microcontroller,
    Fpga,
}

impl PortOwner {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PortOwner::Microcontroller => "apollo",
            PortOwner::Fpga => "fpga",
        }
    }
}

impl fmt::Display for PortOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One sample of the user request button.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonSample {
    Pressed,
    Released,
    /// The board has no dedicated button pin; nothing was sampled.
    Unsupported,
}

impl ButtonSample {
    /// Converts the electrical level of the active-low button pin.
    #[must_use]
    pub const fn from_active_low(pin_high: bool) -> Self {
        if pin_high {
            ButtonSample::Released
        } else {
            ButtonSample::Pressed
        }
    }
}

/// Why ownership changed hands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransferReason {
    /// Direct call from higher-level logic (host command).
    HostRequest,
    /// The user pressed the request button.
    ButtonRequest,
    /// No advertisement arrived within the heartbeat timeout.
    HeartbeatLost,
    /// A fresh advertisement was honoured.
    HeartbeatHonored,
}

impl TransferReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TransferReason::HostRequest => "host-request",
            TransferReason::ButtonRequest => "button",
            TransferReason::HeartbeatLost => "heartbeat-lost",
            TransferReason::HeartbeatHonored => "heartbeat-honored",
        }
    }
}

/// A completed ownership transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OwnershipChange {
    pub from: PortOwner,
    pub to: PortOwner,
    pub reason: TransferReason,
}

/// Electrical controls around the shared port.
pub trait PortHardware {
    /// Detaches Apollo's USB device from the bus (drops the D+ pull-up).
    fn disconnect(&mut self);

    /// Re-attaches Apollo's USB device so the host enumerates it.
    fn connect(&mut self);

    /// Points the physical mux at `owner`.
    fn route_to(&mut self, owner: PortOwner);

    /// Drives the "Apollo owns the port" indicator.
    fn set_indicator(&mut self, lit: bool);
}

impl<T: PortHardware + ?Sized> PortHardware for &mut T {
    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn connect(&mut self) {
        (**self).connect();
    }

    fn route_to(&mut self, owner: PortOwner) {
        (**self).route_to(owner);
    }

    fn set_indicator(&mut self, lit: bool) {
        (**self).set_indicator(lit);
    }
}

/// Arbiter timing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ArbiterConfig {
    /// Advertisements older than this count as a lost heartbeat.
    pub heartbeat_timeout: Duration,
    /// How long the port stays disconnected while changing hands.
    pub settle_delay: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            settle_delay: USB_SETTLE_DELAY,
        }
    }
}

/// Shared-port ownership state machine.
pub struct PortArbiter<'a, H, D> {
    hardware: H,
    delay: D,
    heartbeat: &'a AdvertisementReceiver,
    capabilities: Capabilities,
    config: ArbiterConfig,
    owner: PortOwner,
}

impl<'a, H, D> PortArbiter<'a, H, D>
where
    H: PortHardware,
    D: BlockingDelay,
{
    #[must_use]
    pub fn new(
        hardware: H,
        delay: D,
        heartbeat: &'a AdvertisementReceiver,
        capabilities: Capabilities,
    ) -> Self {
        Self::with_config(
            hardware,
            delay,
            heartbeat,
            capabilities,
            ArbiterConfig::default(),
        )
    }

    #[must_use]
    pub fn with_config(
        hardware: H,
        delay: D,
        heartbeat: &'a AdvertisementReceiver,
        capabilities: Capabilities,
        config: ArbiterConfig,
    ) -> Self {
        let owner = if capabilities.has_usb_switch {
            PortOwner::Fpga
        } else {
            PortOwner::Microcontroller
        };

        Self {
            hardware,
            delay,
            heartbeat,
            capabilities,
            config,
            owner,
        }
    }

    /// Applies the power-on routing.
    ///
    /// With switch hardware the FPGA gets the port and Apollo's own USB
    /// connection stays detached. Without it Apollo is the fixed owner and
    /// nothing is driven.
    pub fn start(&mut self) {
        if self.capabilities.has_usb_switch {
            self.hardware.disconnect();
            self.hardware.route_to(PortOwner::Fpga);
            self.owner = PortOwner::Fpga;
        }
    }

    #[must_use]
    pub const fn owner(&self) -> PortOwner {
        self.owner
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub const fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    #[must_use]
    pub const fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    #[must_use]
    pub const fn heartbeat(&self) -> &'a AdvertisementReceiver {
        self.heartbeat
    }

    /// Returns `true` while the last advertisement is within the timeout.
    #[must_use]
    pub fn heartbeat_fresh(&self, now: Tick) -> bool {
        self.heartbeat.is_fresh(now, self.config.heartbeat_timeout)
    }

    /// Hands the port to the FPGA.
    pub fn hand_off_to_fpga(&mut self) -> Option<OwnershipChange> {
        self.hand_off(TransferReason::HostRequest)
    }

    /// Reclaims the port for Apollo.
    pub fn take_over_from_fpga(&mut self) -> Option<OwnershipChange> {
        self.take_over(TransferReason::HostRequest)
    }

    /// Periodic task step: the button always wins, then heartbeat loss.
    pub fn poll(&mut self, button: ButtonSample, now: Tick) -> Option<OwnershipChange> {
        if self.button_pressed(button) {
            return self.take_over(TransferReason::ButtonRequest);
        }

        if self.capabilities.has_usb_switch && !self.heartbeat_fresh(now) {
            return self.take_over(TransferReason::HeartbeatLost);
        }

        None
    }

    /// Gives the port back to the FPGA if its heartbeat is fresh.
    pub fn honor_heartbeat(&mut self, now: Tick) -> Option<OwnershipChange> {
        if self.capabilities.has_usb_switch && self.heartbeat_fresh(now) {
            self.hand_off(TransferReason::HeartbeatHonored)
        } else {
            None
        }
    }

    fn button_pressed(&self, button: ButtonSample) -> bool {
        // Boards without a dedicated pin never report a press, even if a
        // caller sampled something.
        self.capabilities.has_program_button && matches!(button, ButtonSample::Pressed)
    }

    fn hand_off(&mut self, reason: TransferReason) -> Option<OwnershipChange> {
        if !self.capabilities.has_usb_switch {
            self.hardware.set_indicator(true);
            return None;
        }

        if self.owner == PortOwner::Fpga {
            return None;
        }

        self.hardware.disconnect();
        self.delay.delay(self.config.settle_delay);
        self.hardware.route_to(PortOwner::Fpga);
        self.hardware.set_indicator(false);

        Some(self.set_owner(PortOwner::Fpga, reason))
    }

    fn take_over(&mut self, reason: TransferReason) -> Option<OwnershipChange> {
        if !self.capabilities.has_usb_switch {
            self.hardware.set_indicator(true);
            return None;
        }

        if self.owner == PortOwner::Microcontroller {
            return None;
        }

        self.hardware.route_to(PortOwner::Microcontroller);
        self.hardware.disconnect();
        self.delay.delay(self.config.settle_delay);
        self.hardware.connect();
        self.hardware.set_indicator(true);

        Some(self.set_owner(PortOwner::Microcontroller, reason))
    }

    fn set_owner(&mut self, to: PortOwner, reason: TransferReason) -> OwnershipChange {
        let from = self.owner;
        self.owner = to;
        OwnershipChange { from, to, reason }
    }
}
