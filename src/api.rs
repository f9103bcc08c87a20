//! `Pairbird` API Client
//!
//! [`PairerClient`] mirrors the [`crate::DevicePairer`] operations as async
//! request/response calls over [`PairerChannels`]. Each call sends one request
//! to the [`crate::Processor`] and waits for its answer, so it can be used from
//! any task: UI code, a shell, a web handler.
//!
//! Responses are matched to requests by order. Keep at most one request in
//! flight per set of channels.
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = CHANNELS.client();
//!
//! client.start().await?;
//! let devices = client.available_devices().await?;
//! if let Some(device) = devices.first() {
//!     client.start_pairing(device.addr).await?;
//! }
//! ```

use crate::constants::MAX_VISIBLE_DEVICES;
use crate::{
    BluetoothAddress, Candidate, PairerChannels, PairingError, Request, Response, Status,
};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use heapless::Vec;

/// Async handle on a running [`crate::Processor`]
pub struct PairerClient<'a, M: RawMutex> {
    channels: &'a PairerChannels<M>,
}

impl<M: RawMutex> Clone for PairerClient<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for PairerClient<'_, M> {}

impl<'a, M: RawMutex> PairerClient<'a, M> {
    pub(crate) fn new(channels: &'a PairerChannels<M>) -> Self {
        Self { channels }
    }

    async fn request(&self, request: Request) -> Response {
        self.channels.requests.send(request).await;
        self.channels.responses.receive().await
    }

    async fn command(&self, request: Request) -> Result<(), PairingError> {
        match self.request(request).await {
            Response::Ok => Ok(()),
            Response::Error(e) => Err(e),
            _ => Err(PairingError::UnexpectedResponse),
        }
    }

    /// Start discovery, enabling the radio first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if an attempt is bonding or connecting, or the pairer was disposed.
    pub async fn start(&self) -> Result<(), PairingError> {
        self.command(Request::Start).await
    }

    /// Cancel an armed pairing attempt and disable auto mode.
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::AlreadyInProgress`] while bonding or connecting.
    pub async fn cancel_pairing(&self) -> Result<(), PairingError> {
        self.command(Request::CancelPairing).await
    }

    /// Stop the pairer from selecting targets by itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the pairer was disposed.
    pub async fn disable_auto_pairing(&self) -> Result<(), PairingError> {
        self.command(Request::DisableAutoPairing).await
    }

    /// Tear the pairer down. The processor stops after answering.
    ///
    /// # Errors
    ///
    /// Returns an error if the response is unexpected.
    pub async fn dispose(&self) -> Result<(), PairingError> {
        self.command(Request::Dispose).await
    }

    /// Arm a manual pairing attempt for a visible device.
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::DeviceNotFound`] if the device is not visible, or
    /// [`PairingError::AlreadyInProgress`] while bonding or connecting.
    pub async fn start_pairing(&self, addr: BluetoothAddress) -> Result<(), PairingError> {
        self.command(Request::StartPairing(addr)).await
    }

    /// Drop a device from the visible set.
    ///
    /// # Errors
    ///
    /// Returns an error if the pairer was disposed.
    pub async fn invalidate_device(&self, addr: BluetoothAddress) -> Result<(), PairingError> {
        self.command(Request::InvalidateDevice(addr)).await
    }

    /// Empty the visible set.
    ///
    /// # Errors
    ///
    /// Returns an error if the pairer was disposed.
    pub async fn clear_device_list(&self) -> Result<(), PairingError> {
        self.command(Request::ClearDeviceList).await
    }

    /// Get the current pairing status.
    ///
    /// # Errors
    ///
    /// Returns an error if the response is unexpected.
    pub async fn status(&self) -> Result<Status, PairingError> {
        match self.request(Request::GetStatus).await {
            Response::Status(status) => Ok(status),
            Response::Error(e) => Err(e),
            _ => Err(PairingError::UnexpectedResponse),
        }
    }

    /// Get the armed, bonding or connecting target.
    ///
    /// # Errors
    ///
    /// Returns an error if the response is unexpected.
    pub async fn target_device(&self) -> Result<Option<Candidate>, PairingError> {
        match self.request(Request::GetTargetDevice).await {
            Response::TargetDevice(target) => Ok(target),
            Response::Error(e) => Err(e),
            _ => Err(PairingError::UnexpectedResponse),
        }
    }

    /// Get a snapshot of the visible candidates.
    ///
    /// # Errors
    ///
    /// Returns an error if the response is unexpected.
    pub async fn available_devices(
        &self,
    ) -> Result<Vec<Candidate, MAX_VISIBLE_DEVICES>, PairingError> {
        match self.request(Request::GetAvailableDevices).await {
            Response::Devices(devices) => Ok(devices),
            Response::Error(e) => Err(e),
            _ => Err(PairingError::UnexpectedResponse),
        }
    }

    /// Get the time the armed stage fires, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the response is unexpected.
    pub async fn next_stage_time(&self) -> Result<Option<Instant>, PairingError> {
        match self.request(Request::GetNextStageTime).await {
            Response::NextStageTime(at) => Ok(at),
            Response::Error(e) => Err(e),
            _ => Err(PairingError::UnexpectedResponse),
        }
    }
}
