#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::too_many_lines)]

#[macro_use]
mod fmt;

mod address;
pub mod api;
pub mod class_of_device;
pub mod connector;
pub mod constants;
pub mod criteria;
pub mod pairer;
pub mod platform;
pub mod processor;

use crate::constants::{
    AUTO_PAIR_DELAY, MANUAL_PAIR_DELAY, MAX_ACTIONS, MAX_CHANNELS, MAX_DEVICE_NAME_LENGTH,
    MAX_VISIBLE_DEVICES, PROFILE_CONNECT_TIMEOUT, RETRY_DELAY,
};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_time::{Duration, Instant};
use heapless::{String, Vec};

pub use address::BluetoothAddress;
pub use api::PairerClient;
pub use class_of_device::{ClassOfDevice, MajorDeviceClass};
pub use connector::{Connector, Profile, ProfileConnectionState, ProfilePriority};
pub use criteria::{AudioDeviceCriteria, CandidateCriteria, CriteriaSet, InputDeviceCriteria};
pub use pairer::{DevicePairer, Status};
pub use platform::{BluetoothTransport, DeviceScanner, PairingListener};
pub use processor::Processor;

/// Bond (link key) state of a remote device as last reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BondState {
    /// No link key is stored
    #[default]
    None,
    /// Key exchange is in progress
    Bonding,
    /// A link key is stored
    Bonded,
}

/// A discovered accessory that may be chosen as pairing target
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Candidate {
    /// Bluetooth device address (`BD_ADDR`), also the transport handle
    pub addr: BluetoothAddress,
    /// Class of Device (`CoD`) reported during discovery
    pub class_of_device: ClassOfDevice,
    /// Device name, if available (up to 32 bytes)
    pub name: Option<String<MAX_DEVICE_NAME_LENGTH>>,
    /// Received Signal Strength Indicator (RSSI) in dBm, if available
    pub rssi: Option<i8>,
    /// Last known bond state
    pub bond_state: BondState,
}

impl Candidate {
    /// Create a new candidate
    #[must_use]
    pub fn new(addr: BluetoothAddress, class_of_device: ClassOfDevice) -> Self {
        Self {
            addr,
            class_of_device,
            name: None,
            rssi: None,
            bond_state: BondState::None,
        }
    }

    /// Update candidate with new RSSI information
    #[must_use]
    pub fn with_rssi(mut self, rssi: i8) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Update candidate with new name information
    #[must_use]
    pub fn with_name(mut self, name: String<MAX_DEVICE_NAME_LENGTH>) -> Self {
        self.name = Some(name);
        self
    }

    /// Update candidate with the bond state known at discovery time
    #[must_use]
    pub fn with_bond_state(mut self, bond_state: BondState) -> Self {
        self.bond_state = bond_state;
        self
    }

    /// Merge a fresh discovery report for the same address into this entry
    ///
    /// Fields absent from the report keep their previous values.
    pub fn refresh(&mut self, report: &Candidate) {
        self.class_of_device = report.class_of_device;
        self.bond_state = report.bond_state;
        if report.name.is_some() {
            self.name.clone_from(&report.name);
        }
        if report.rssi.is_some() {
            self.rssi = report.rssi;
        }
    }
}

/// Pairing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairingError {
    /// Malformed Bluetooth address
    InvalidAddress,
    /// The radio could not be enabled
    RadioUnavailable,
    /// Bonding regressed from `Bonding` to `None`, or the bond request was rejected
    BondFailed,
    /// No connector handles the target's device class
    ConnectorUnavailable,
    /// The profile proxy service went away before the connection settled
    ProfileServiceDisconnected,
    /// The profile reported a disconnect instead of a connection
    ProfileConnectFailed,
    /// The profile did not connect within the configured timeout
    ConnectTimeout,
    /// A pairing attempt is already bonding or connecting
    AlreadyInProgress,
    /// The requested device is not in the visible set
    DeviceNotFound,
    /// The pairer was disposed
    Disposed,
    /// The processor answered with a response of the wrong kind
    UnexpectedResponse,
}

/// Options for configuring a [`DevicePairer`]
///
/// ```rust
/// use pairbird::PairerOptions;
/// use embassy_time::Duration;
///
/// let quick = PairerOptions {
///     auto_pair_delay: Duration::from_secs(3),
///     ..PairerOptions::default()
/// };
/// assert!(!quick.audio_available);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairerOptions {
    /// Delay from auto-selecting a candidate to starting the bond
    pub auto_pair_delay: Duration,
    /// Delay from a manual pairing request to starting the bond
    pub manual_pair_delay: Duration,
    /// Delay from an `Error` status to the automatic return to scanning
    pub retry_delay: Duration,
    /// Upper bound on the `Connecting` phase, enforced by the [`Processor`]
    pub connect_timeout: Duration,
    /// Whether the host offers the audio (A2DP) profile service
    ///
    /// Enables both the audio candidate criterion and the audio connector.
    pub audio_available: bool,
}

impl Default for PairerOptions {
    fn default() -> Self {
        Self {
            auto_pair_delay: AUTO_PAIR_DELAY,
            manual_pair_delay: MANUAL_PAIR_DELAY,
            retry_delay: RETRY_DELAY,
            connect_timeout: PROFILE_CONNECT_TIMEOUT,
            audio_available: false,
        }
    }
}

/// Asynchronous inputs from the radio, scanner and profile services
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The radio was switched on or off
    RadioStateChanged {
        /// New radio state
        enabled: bool,
    },
    /// The scanner reported a device
    DeviceFound(Candidate),
    /// The scanner stopped seeing a device
    DeviceLost(BluetoothAddress),
    /// Bond state broadcast
    BondStateChanged {
        /// Device the broadcast is about
        addr: BluetoothAddress,
        /// New bond state
        state: BondState,
        /// Bond state before the change
        previous: BondState,
    },
    /// The transport refused a bond request outright
    BondRequestFailed(BluetoothAddress),
    /// A requested profile proxy is ready
    ProfileProxyConnected(Profile),
    /// A profile proxy service went away
    ProfileServiceDisconnected(Profile),
    /// Profile connection-state broadcast
    ProfileStateChanged {
        /// Profile the broadcast is about
        profile: Profile,
        /// Device the broadcast is about
        addr: BluetoothAddress,
        /// New connection state
        state: ProfileConnectionState,
    },
    /// The stage deadline elapsed
    TimerExpired,
    /// The processor's connect timeout elapsed while connecting
    ConnectTimedOut,
}

/// Side effects requested by a state transition, executed by the [`Processor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Ask the transport to switch the radio on
    EnableRadio,
    /// Begin discovery with the given acceptance criteria
    StartScan(CriteriaSet),
    /// Stop delivering discovery results
    StopScan,
    /// Abort any inquiry currently running on the controller
    StopScanNow,
    /// Start bonding with a device
    CreateBond(BluetoothAddress),
    /// Abort an in-flight bond
    CancelBond(BluetoothAddress),
    /// Forget a device's link key
    RemoveBond(BluetoothAddress),
    /// Request a profile proxy handle
    AcquireProfileProxy(Profile),
    /// Return a profile proxy handle
    ReleaseProfileProxy(Profile),
    /// Start receiving connection-state broadcasts for one device
    SubscribeProfileState {
        /// Profile to listen on
        profile: Profile,
        /// Device to filter on
        addr: BluetoothAddress,
    },
    /// Stop receiving connection-state broadcasts for one device
    UnsubscribeProfileState {
        /// Profile to stop listening on
        profile: Profile,
        /// Device filter to drop
        addr: BluetoothAddress,
    },
    /// Open the profile-level connection
    ConnectProfile {
        /// Profile to connect
        profile: Profile,
        /// Device to connect to
        addr: BluetoothAddress,
    },
    /// Pin the profile priority for a device
    SetProfilePriority {
        /// Profile to configure
        profile: Profile,
        /// Device to configure
        addr: BluetoothAddress,
        /// Priority to pin
        priority: ProfilePriority,
    },
    /// Tell the listener that status, target or visible set changed
    NotifyListener,
}

/// Batch of actions produced by one transition
pub type Actions = Vec<Action, MAX_ACTIONS>;

pub(crate) fn push_action(actions: &mut Actions, action: Action) {
    if let Err(dropped) = actions.push(action) {
        error!("[PAIRER] Action batch full, dropping {:?}", dropped);
    }
}

/// API requests sent to the processor
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Request {
    Start,
    CancelPairing,
    DisableAutoPairing,
    Dispose,
    StartPairing(BluetoothAddress),
    InvalidateDevice(BluetoothAddress),
    ClearDeviceList,
    GetStatus,
    GetTargetDevice,
    GetAvailableDevices,
    GetNextStageTime,
}

/// API responses sent back from the processor
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Response {
    Ok,
    Status(Status),
    TargetDevice(Option<Candidate>),
    Devices(Vec<Candidate, MAX_VISIBLE_DEVICES>),
    NextStageTime(Option<Instant>),
    Error(PairingError),
}

/// Channels connecting API clients and platform drivers to one [`Processor`]
///
/// Owned by the application (typically in a `static` or `StaticCell`) and
/// borrowed by the processor, its clients and the event sources.
pub struct PairerChannels<M: RawMutex> {
    pub(crate) requests: Channel<M, Request, MAX_CHANNELS>,
    pub(crate) responses: Channel<M, Response, MAX_CHANNELS>,
    pub(crate) events: Channel<M, Event, MAX_CHANNELS>,
}

impl<M: RawMutex> PairerChannels<M> {
    /// Create an empty set of channels
    #[must_use]
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            responses: Channel::new(),
            events: Channel::new(),
        }
    }

    /// Sender used by scanner, radio and profile drivers to post [`Event`]s
    #[must_use]
    pub fn event_sender(&self) -> Sender<'_, M, Event, MAX_CHANNELS> {
        self.events.sender()
    }

    /// Request/response client for the pairer API
    #[must_use]
    pub fn client(&self) -> PairerClient<'_, M> {
        PairerClient::new(self)
    }
}

impl<M: RawMutex> Default for PairerChannels<M> {
    fn default() -> Self {
        Self::new()
    }
}
