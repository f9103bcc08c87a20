//! Platform collaborators
//!
//! The pairer reaches hardware and UI only through these traits. Requests are
//! fire-and-forget: their results come back later as [`crate::Event`]s posted
//! through [`crate::PairerChannels::event_sender`]. A method returning `Err`
//! means the request was refused outright; the [`crate::Processor`] turns that
//! into the matching failure event.

use crate::{
    BluetoothAddress, CriteriaSet, DevicePairer, PairingError, Profile, ProfilePriority,
};

/// Discovery driver
pub trait DeviceScanner {
    /// Start (or restart) discovery, reporting devices accepted by `criteria`
    ///
    /// Devices already visible are reported again after a restart.
    fn start_listening(&mut self, criteria: &CriteriaSet);

    /// Stop reporting discovery results
    fn stop_listening(&mut self);

    /// Abort any inquiry currently running on the controller
    fn stop_now(&mut self);
}

/// Radio, bond and profile services of the Bluetooth stack
pub trait BluetoothTransport {
    /// Whether the radio is currently on
    fn is_radio_enabled(&self) -> bool;

    /// Ask for the radio to be switched on; completion arrives as
    /// [`crate::Event::RadioStateChanged`]
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::RadioUnavailable`] if the radio cannot be enabled.
    fn enable_radio(&mut self) -> Result<(), PairingError>;

    /// Start bonding; progress arrives as [`crate::Event::BondStateChanged`]
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::BondFailed`] if the request is refused.
    fn create_bond(&mut self, addr: BluetoothAddress) -> Result<(), PairingError>;

    /// Abort an in-flight bond
    fn cancel_bond(&mut self, addr: BluetoothAddress);

    /// Forget the link key for a device
    fn remove_bond(&mut self, addr: BluetoothAddress);

    /// Request a profile proxy; readiness arrives as
    /// [`crate::Event::ProfileProxyConnected`]
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::ProfileServiceDisconnected`] if the profile
    /// service is not running.
    fn acquire_profile_proxy(&mut self, profile: Profile) -> Result<(), PairingError>;

    /// Return a profile proxy
    fn release_profile_proxy(&mut self, profile: Profile);

    /// Start posting [`crate::Event::ProfileStateChanged`] for one device
    fn subscribe_profile_state(&mut self, profile: Profile, addr: BluetoothAddress);

    /// Stop posting connection-state events for one device
    fn unsubscribe_profile_state(&mut self, profile: Profile, addr: BluetoothAddress);

    /// Open the profile connection
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::ProfileConnectFailed`] if the request is refused.
    fn connect_profile(
        &mut self,
        profile: Profile,
        addr: BluetoothAddress,
    ) -> Result<(), PairingError>;

    /// Pin the profile priority for a device
    fn set_profile_priority(
        &mut self,
        profile: Profile,
        addr: BluetoothAddress,
        priority: ProfilePriority,
    );
}

/// Receives a notification whenever status, target or visible set change
pub trait PairingListener {
    /// Called after the transition; pull whatever is needed from `pairer`
    fn status_changed(&mut self, pairer: &DevicePairer);
}

impl PairingListener for () {
    fn status_changed(&mut self, _pairer: &DevicePairer) {}
}
