//! Profile connectors
//!
//! Once a target is bonded, a [`Connector`] opens the profile-level session that
//! makes the accessory usable: the input (HID host) profile for peripherals, the
//! audio (A2DP) profile for audio sinks.
//!
//! ## Procedure
//!
//! 1. Request a profile proxy handle ([`Action::AcquireProfileProxy`])
//! 2. When the proxy is ready, subscribe to connection-state broadcasts for the
//!    target address, request the connection and pin the profile priority to
//!    auto-connect so the accessory reconnects on its own later
//! 3. The first `Connected` or `Disconnected` broadcast for the target settles
//!    the attempt
//!
//! Every exit path (settled, proxy service lost, aborted) releases the
//! subscription and the proxy exactly once, and reports exactly one outcome.

use crate::{
    Action, Actions, BluetoothAddress, ClassOfDevice, MajorDeviceClass, PairingError, push_action,
};

/// Profiles a connector can open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// HID host profile for keyboards, mice, gamepads and remotes
    Input,
    /// A2DP source profile for headphones and speakers
    Audio,
}

impl Profile {
    /// Pick the connector profile for a bonded device's class
    ///
    /// Returns `None` when no connector handles the major class, or when the
    /// device is an audio sink and the host has no audio profile service.
    #[must_use]
    pub fn for_class(class: ClassOfDevice, audio_available: bool) -> Option<Self> {
        match class.major_device_class() {
            MajorDeviceClass::Peripheral => Some(Self::Input),
            MajorDeviceClass::AudioVideo if audio_available => Some(Self::Audio),
            _ => None,
        }
    }

    /// Short profile name for logs and UI
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Input => "HID",
            Self::Audio => "A2DP",
        }
    }
}

/// Profile-level connection state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileConnectionState {
    /// No profile connection
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Profile connection established
    Connected,
    /// Disconnection in progress
    Disconnecting,
}

/// Profile priority values understood by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfilePriority {
    /// Never connect this profile
    Off,
    /// Connect when asked
    On,
    /// Reconnect automatically whenever the device shows up
    AutoConnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ProxyState {
    Requested,
    Held,
    Released,
}

/// One connection attempt for one target
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connector {
    profile: Profile,
    target: BluetoothAddress,
    proxy: ProxyState,
    subscribed: bool,
    settled: bool,
}

impl Connector {
    /// Start a connection attempt, requesting the profile proxy
    pub fn open(profile: Profile, target: BluetoothAddress, actions: &mut Actions) -> Self {
        debug!("[CONNECTOR] Opening {} connection to {}", profile.name(), target);
        push_action(actions, Action::AcquireProfileProxy(profile));
        Self {
            profile,
            target,
            proxy: ProxyState::Requested,
            subscribed: false,
            settled: false,
        }
    }

    /// Profile this connector drives
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Device this connector targets
    #[must_use]
    pub fn target(&self) -> BluetoothAddress {
        self.target
    }

    /// True once an outcome has been reported
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// The requested proxy is ready: subscribe, connect and pin priority
    pub fn on_proxy_connected(&mut self, profile: Profile, actions: &mut Actions) {
        if self.settled || profile != self.profile || self.proxy != ProxyState::Requested {
            return;
        }
        self.proxy = ProxyState::Held;
        self.subscribed = true;

        push_action(
            actions,
            Action::SubscribeProfileState {
                profile,
                addr: self.target,
            },
        );
        push_action(
            actions,
            Action::ConnectProfile {
                profile,
                addr: self.target,
            },
        );
        push_action(
            actions,
            Action::SetProfilePriority {
                profile,
                addr: self.target,
                priority: ProfilePriority::AutoConnect,
            },
        );
    }

    /// Connection-state broadcast; settles on the first terminal state for the target
    pub fn on_state_changed(
        &mut self,
        profile: Profile,
        addr: BluetoothAddress,
        state: ProfileConnectionState,
        actions: &mut Actions,
    ) -> Option<Result<(), PairingError>> {
        if self.settled || !self.subscribed || profile != self.profile || addr != self.target {
            return None;
        }
        let outcome = match state {
            ProfileConnectionState::Connected => Ok(()),
            ProfileConnectionState::Disconnected => Err(PairingError::ProfileConnectFailed),
            ProfileConnectionState::Connecting | ProfileConnectionState::Disconnecting => {
                return None;
            }
        };
        self.settle(outcome, actions)
    }

    /// The proxy service went away; fails the attempt if still open
    pub fn on_service_disconnected(
        &mut self,
        profile: Profile,
        actions: &mut Actions,
    ) -> Option<Result<(), PairingError>> {
        if self.settled || profile != self.profile {
            return None;
        }
        warn!("[CONNECTOR] {} service disconnected", profile.name());
        self.settle(Err(PairingError::ProfileServiceDisconnected), actions)
    }

    /// Give up on the attempt (timeout, disposal)
    pub fn abort(
        &mut self,
        reason: PairingError,
        actions: &mut Actions,
    ) -> Option<Result<(), PairingError>> {
        if self.settled {
            return None;
        }
        self.settle(Err(reason), actions)
    }

    fn settle(
        &mut self,
        outcome: Result<(), PairingError>,
        actions: &mut Actions,
    ) -> Option<Result<(), PairingError>> {
        self.settled = true;
        if self.subscribed {
            self.subscribed = false;
            push_action(
                actions,
                Action::UnsubscribeProfileState {
                    profile: self.profile,
                    addr: self.target,
                },
            );
        }
        if self.proxy != ProxyState::Released {
            self.proxy = ProxyState::Released;
            push_action(actions, Action::ReleaseProfileProxy(self.profile));
        }
        debug!(
            "[CONNECTOR] {} connection to {} settled: {:?}",
            self.profile.name(),
            self.target,
            outcome
        );
        Some(outcome)
    }
}
