//! Processor - drives the pairer from requests, events and timers
//!
//! The [`Processor`] is the single serial context in which every pairing
//! transition happens. It owns the [`DevicePairer`] and the platform
//! collaborators, borrows the [`PairerChannels`], and multiplexes three inputs:
//!
//! * **API requests** from [`crate::PairerClient`], each answered with one response
//! * **Events** posted by scanner, radio, bond and profile drivers
//! * **Timers**: the pairer's stage deadline and the profile connect timeout
//!
//! Every transition yields a batch of [`Action`]s which the processor executes
//! against the [`DeviceScanner`], [`BluetoothTransport`] and [`PairingListener`].
//! A refused transport request is fed back into the pairer as the matching
//! failure event.
//!
//! # Usage
//!
//! ```rust,ignore
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use pairbird::{PairerChannels, PairerOptions, Processor};
//!
//! static CHANNELS: PairerChannels<CriticalSectionRawMutex> = PairerChannels::new();
//!
//! #[embassy_executor::task]
//! async fn pairing_task(scanner: MyScanner, transport: MyTransport) {
//!     let mut processor: Processor<'_, _, _, _> =
//!         Processor::new(PairerOptions::default(), &CHANNELS, scanner, transport);
//!     processor.run().await;
//! }
//!
//! async fn app() -> Result<(), pairbird::PairingError> {
//!     let client = CHANNELS.client();
//!     client.start().await?;
//!     let status = client.status().await?;
//!     Ok(())
//! }
//! ```

use crate::constants::MAX_ACTIONS;
use crate::{
    Action, Actions, BluetoothTransport, DevicePairer, DeviceScanner, Event, PairerChannels,
    PairerOptions, PairingListener, ProfileConnectionState, Request, Response, Status,
};
use embassy_futures::select::{Either, Either3, select, select3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use heapless::Vec;

/// One input to the processor loop
#[derive(Debug)]
pub(crate) enum Input {
    Request(Request),
    Event(Event),
    Tick,
}

/// Runs a [`DevicePairer`] against its platform collaborators
pub struct Processor<'a, M: RawMutex, S, T, L = ()> {
    pairer: DevicePairer,
    channels: &'a PairerChannels<M>,
    scanner: S,
    transport: T,
    listener: Option<L>,
    connect_deadline: Option<Instant>,
}

impl<'a, M, S, T, L> Processor<'a, M, S, T, L>
where
    M: RawMutex,
    S: DeviceScanner,
    T: BluetoothTransport,
    L: PairingListener,
{
    /// Create a processor; the radio state is read from `transport`
    pub fn new(
        options: PairerOptions,
        channels: &'a PairerChannels<M>,
        scanner: S,
        transport: T,
    ) -> Self {
        let pairer = DevicePairer::new(options, transport.is_radio_enabled());
        Self {
            pairer,
            channels,
            scanner,
            transport,
            listener: None,
            connect_deadline: None,
        }
    }

    /// Install the listener notified on every status change
    pub fn set_listener(&mut self, listener: L) {
        self.listener = Some(listener);
    }

    /// The installed listener
    pub fn listener(&self) -> Option<&L> {
        self.listener.as_ref()
    }

    /// The state machine
    pub fn pairer(&self) -> &DevicePairer {
        &self.pairer
    }

    /// The discovery driver
    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    /// The Bluetooth stack
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Process requests, events and timers until the pairer is disposed
    pub async fn run(&mut self) {
        info!("[PROCESSOR] Pairing processor running");
        let channels = self.channels;

        while !self.pairer.is_disposed() {
            let input = match self.next_wakeup() {
                Some(at) => match select3(
                    channels.requests.receive(),
                    channels.events.receive(),
                    Timer::at(at),
                )
                .await
                {
                    Either3::First(request) => Input::Request(request),
                    Either3::Second(event) => Input::Event(event),
                    Either3::Third(()) => Input::Tick,
                },
                None => match select(channels.requests.receive(), channels.events.receive()).await
                {
                    Either::First(request) => Input::Request(request),
                    Either::Second(event) => Input::Event(event),
                },
            };

            if let Some(response) = self.dispatch(input, Instant::now()) {
                debug!("[PROCESSOR] API response: {:?}", response);
                channels.responses.send(response).await;
            }
        }
        info!("[PROCESSOR] Pairer disposed, stopping");
    }

    /// Earliest of the stage deadline and the connect timeout
    fn next_wakeup(&self) -> Option<Instant> {
        match (self.pairer.next_stage_time(), self.connect_deadline) {
            (Some(stage), Some(connect)) => Some(stage.min(connect)),
            (stage, connect) => stage.or(connect),
        }
    }

    pub(crate) fn dispatch(&mut self, input: Input, now: Instant) -> Option<Response> {
        let response = match input {
            Input::Request(request) => {
                debug!("[PROCESSOR] API request: {:?}", request);
                Some(self.handle_request(request, now))
            }
            Input::Event(event) => {
                debug!("[PROCESSOR] Event: {:?}", event);
                self.handle_event(event, now);
                None
            }
            Input::Tick => {
                self.handle_tick(now);
                None
            }
        };
        self.track_connect_deadline(now);
        response
    }

    fn handle_request(&mut self, request: Request, now: Instant) -> Response {
        let result = match request {
            Request::Start => self.pairer.start(now),
            Request::CancelPairing => self.pairer.cancel_pairing(),
            Request::DisableAutoPairing => {
                self.pairer.disable_auto_pairing().map(|()| Actions::new())
            }
            Request::Dispose => Ok(self.pairer.dispose()),
            Request::StartPairing(addr) => self.pairer.start_pairing(addr, now),
            Request::InvalidateDevice(addr) => self.pairer.invalidate_device(addr, now),
            Request::ClearDeviceList => self.pairer.clear_device_list(now),
            Request::GetStatus => return Response::Status(self.pairer.status()),
            Request::GetTargetDevice => {
                return Response::TargetDevice(self.pairer.target_device().cloned());
            }
            Request::GetAvailableDevices => {
                return Response::Devices(self.pairer.available_devices());
            }
            Request::GetNextStageTime => {
                return Response::NextStageTime(self.pairer.next_stage_time());
            }
        };

        match result {
            Ok(actions) => {
                self.apply(actions, now);
                Response::Ok
            }
            Err(e) => Response::Error(e),
        }
    }

    fn handle_tick(&mut self, now: Instant) {
        if self.connect_deadline.is_some_and(|at| now >= at) {
            self.connect_deadline = None;
            self.handle_event(Event::ConnectTimedOut, now);
        }
        if self.pairer.next_stage_time().is_some_and(|at| now >= at) {
            self.handle_event(Event::TimerExpired, now);
        }
    }

    fn handle_event(&mut self, event: Event, now: Instant) {
        let actions = self.pairer.handle_event(event, now);
        self.apply(actions, now);
    }

    /// The connect timeout covers one continuous stay in `Connecting`
    fn track_connect_deadline(&mut self, now: Instant) {
        if self.pairer.status() == Status::Connecting {
            if self.connect_deadline.is_none() {
                self.connect_deadline = Some(now + self.pairer.options().connect_timeout);
            }
        } else {
            self.connect_deadline = None;
        }
    }

    /// Execute one batch, then feed refusals back as events
    fn apply(&mut self, actions: Actions, now: Instant) {
        let mut follow_ups: Vec<Event, MAX_ACTIONS> = Vec::new();
        let mut notify = false;

        for action in actions {
            trace!("[PROCESSOR] Action: {:?}", action);
            let follow_up = match action {
                Action::EnableRadio => {
                    if let Err(e) = self.transport.enable_radio() {
                        warn!("[PROCESSOR] Radio enable refused: {:?}", e);
                    }
                    None
                }
                Action::StartScan(criteria) => {
                    self.scanner.start_listening(&criteria);
                    None
                }
                Action::StopScan => {
                    self.scanner.stop_listening();
                    None
                }
                Action::StopScanNow => {
                    self.scanner.stop_now();
                    None
                }
                Action::CreateBond(addr) => match self.transport.create_bond(addr) {
                    Ok(()) => None,
                    Err(e) => {
                        warn!("[PROCESSOR] Bond request for {} refused: {:?}", addr, e);
                        Some(Event::BondRequestFailed(addr))
                    }
                },
                Action::CancelBond(addr) => {
                    self.transport.cancel_bond(addr);
                    None
                }
                Action::RemoveBond(addr) => {
                    self.transport.remove_bond(addr);
                    None
                }
                Action::AcquireProfileProxy(profile) => {
                    match self.transport.acquire_profile_proxy(profile) {
                        Ok(()) => None,
                        Err(e) => {
                            warn!("[PROCESSOR] {} proxy refused: {:?}", profile.name(), e);
                            Some(Event::ProfileServiceDisconnected(profile))
                        }
                    }
                }
                Action::ReleaseProfileProxy(profile) => {
                    self.transport.release_profile_proxy(profile);
                    None
                }
                Action::SubscribeProfileState { profile, addr } => {
                    self.transport.subscribe_profile_state(profile, addr);
                    None
                }
                Action::UnsubscribeProfileState { profile, addr } => {
                    self.transport.unsubscribe_profile_state(profile, addr);
                    None
                }
                Action::ConnectProfile { profile, addr } => {
                    match self.transport.connect_profile(profile, addr) {
                        Ok(()) => None,
                        Err(e) => {
                            warn!(
                                "[PROCESSOR] {} connect to {} refused: {:?}",
                                profile.name(),
                                addr,
                                e
                            );
                            Some(Event::ProfileStateChanged {
                                profile,
                                addr,
                                state: ProfileConnectionState::Disconnected,
                            })
                        }
                    }
                }
                Action::SetProfilePriority {
                    profile,
                    addr,
                    priority,
                } => {
                    self.transport.set_profile_priority(profile, addr, priority);
                    None
                }
                Action::NotifyListener => {
                    notify = true;
                    None
                }
            };

            if let Some(event) = follow_up {
                if follow_ups.push(event).is_err() {
                    error!("[PROCESSOR] Follow-up queue full, dropping event");
                }
            }
        }

        if notify {
            if let Some(listener) = self.listener.as_mut() {
                listener.status_changed(&self.pairer);
            }
        }
        for event in follow_ups {
            self.handle_event(event, now);
        }
    }
}
