//! Pairing state machine
//!
//! [`DevicePairer`] owns the pairing status, the visible candidate set, the
//! chosen target and the single stage deadline. It never touches hardware:
//! every transition consumes a request or an [`Event`] together with the current
//! [`Instant`] and returns the [`Actions`] the [`crate::Processor`] must execute.
//!
//! ```text
//!            start()                 1 input match / start_pairing()
//!   None ───────────────► Scanning ─────────────────────────────────► WaitingToPair
//!    ▲                      ▲  ▲        0 or 2+ matches (auto arm)         │
//!    │                      │  └───────────────────────────────────────────┤
//!    │                retry │                                 timer fires  │
//!    │                      │                                              ▼
//!    │  connected         Error ◄──────── bond failed ─────────────────  Pairing
//!    └─────────────── Connecting ◄──────── bonded ─────────────────────────┘
//! ```

use crate::constants::MAX_VISIBLE_DEVICES;
use crate::{
    Action, Actions, BluetoothAddress, BondState, Candidate, Connector, CriteriaSet, Event,
    PairerOptions, PairingError, Profile, ProfileConnectionState, push_action,
};
use embassy_time::Instant;
use heapless::Vec;

/// Pairing status, the single source of truth for the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Idle
    #[default]
    None,
    /// Discovering candidates
    Scanning,
    /// A target is chosen and the bond stage is armed
    WaitingToPair,
    /// Bonding with the target
    Pairing,
    /// Opening the profile connection to the bonded target
    Connecting,
    /// The last attempt failed
    Error,
}

impl Status {
    /// Human-readable phase label
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "Idle",
            Self::Scanning => "Searching for accessories",
            Self::WaitingToPair => "Waiting to pair",
            Self::Pairing => "Pairing",
            Self::Connecting => "Connecting",
            Self::Error => "Error",
        }
    }

    /// True while an attempt is bonding or connecting and cannot be interrupted
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Pairing | Self::Connecting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Stage {
    Bond,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Deadline {
    at: Instant,
    stage: Stage,
}

/// The accessory pairing state machine
#[derive(Debug)]
pub struct DevicePairer {
    options: PairerOptions,
    criteria: CriteriaSet,
    status: Status,
    visible: Vec<Candidate, MAX_VISIBLE_DEVICES>,
    target: Option<Candidate>,
    keep_bond: bool,
    input_overflow: bool,
    auto_mode: bool,
    auto_armed: bool,
    deadline: Option<Deadline>,
    connector: Option<Connector>,
    radio_enabled: bool,
    start_pending: bool,
    scanning: bool,
    disposed: bool,
    last_error: Option<PairingError>,
}

impl DevicePairer {
    /// Create an idle pairer in auto mode
    #[must_use]
    pub fn new(options: PairerOptions, radio_enabled: bool) -> Self {
        Self {
            options,
            criteria: CriteriaSet::new(options.audio_available),
            status: Status::None,
            visible: Vec::new(),
            target: None,
            keep_bond: false,
            input_overflow: false,
            auto_mode: true,
            auto_armed: false,
            deadline: None,
            connector: None,
            radio_enabled,
            start_pending: false,
            scanning: false,
            disposed: false,
            last_error: None,
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// The armed, bonding or connecting target
    #[must_use]
    pub fn target_device(&self) -> Option<&Candidate> {
        self.target.as_ref()
    }

    /// Visible candidates, in discovery order
    #[must_use]
    pub fn visible_devices(&self) -> &[Candidate] {
        &self.visible
    }

    /// Owned snapshot of the visible candidates
    #[must_use]
    pub fn available_devices(&self) -> Vec<Candidate, MAX_VISIBLE_DEVICES> {
        self.visible.clone()
    }

    /// When the armed stage (bond or restart) fires, if one is armed
    #[must_use]
    pub fn next_stage_time(&self) -> Option<Instant> {
        self.deadline.map(|deadline| deadline.at)
    }

    /// Human-readable description of what the pairer is doing
    #[must_use]
    pub fn phase_description(&self) -> &'static str {
        match self.status {
            Status::WaitingToPair if self.auto_armed => "Waiting to pair automatically",
            Status::Error if self.deadline.is_some() => "Error, retrying shortly",
            status => status.description(),
        }
    }

    /// True while the pairer may select a target by itself
    #[must_use]
    pub fn is_auto_mode(&self) -> bool {
        self.auto_mode
    }

    /// True once [`DevicePairer::dispose`] has run
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// True while the scanner is listening
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Reason for the most recent `Error` status
    #[must_use]
    pub fn last_error(&self) -> Option<PairingError> {
        self.last_error
    }

    /// Candidate criteria this pairer was built with
    #[must_use]
    pub fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    /// Options this pairer was built with
    #[must_use]
    pub fn options(&self) -> &PairerOptions {
        &self.options
    }

    /// Begin discovery, enabling the radio first if needed
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::AlreadyInProgress`] while bonding or connecting,
    /// or [`PairingError::Disposed`] after disposal.
    pub fn start(&mut self, now: Instant) -> Result<Actions, PairingError> {
        self.ensure_active()?;
        let mut actions = Actions::new();
        match self.status {
            Status::Pairing | Status::Connecting => return Err(PairingError::AlreadyInProgress),
            Status::Scanning | Status::WaitingToPair => {}
            Status::None | Status::Error => {
                if self.radio_enabled {
                    self.begin_scanning(&mut actions);
                    self.evaluate_auto(now, &mut actions);
                } else {
                    info!("[PAIRER] Radio disabled, enabling before scanning");
                    self.start_pending = true;
                    push_action(&mut actions, Action::EnableRadio);
                }
            }
        }
        Ok(actions)
    }

    /// Cancel an armed attempt and turn auto mode off
    ///
    /// In `WaitingToPair` the timer is cancelled, the target cleared, its bond
    /// removed and scanning resumed. In other idle phases only auto mode is
    /// turned off.
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::AlreadyInProgress`] while bonding or connecting;
    /// nothing changes in that case.
    pub fn cancel_pairing(&mut self) -> Result<Actions, PairingError> {
        self.ensure_active()?;
        if self.status.is_in_progress() {
            warn!(
                "[PAIRER] Cannot cancel while {}",
                self.status.description()
            );
            return Err(PairingError::AlreadyInProgress);
        }

        let mut actions = Actions::new();
        self.auto_mode = false;
        if self.status == Status::WaitingToPair {
            self.deadline = None;
            self.auto_armed = false;
            if let Some(target) = self.release_target(&mut actions) {
                info!("[PAIRER] Pairing with {} cancelled", target.addr);
            }
            self.resume_scanning(&mut actions);
            self.set_status(Status::None, &mut actions);
        }
        Ok(actions)
    }

    /// Stop the pairer from choosing targets by itself
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::Disposed`] after disposal.
    pub fn disable_auto_pairing(&mut self) -> Result<(), PairingError> {
        self.ensure_active()?;
        self.auto_mode = false;
        Ok(())
    }

    /// Tear everything down; the pairer is terminal afterwards
    pub fn dispose(&mut self) -> Actions {
        let mut actions = Actions::new();
        if self.disposed {
            return actions;
        }
        info!("[PAIRER] Disposing");

        self.deadline = None;
        if let Some(mut connector) = self.connector.take() {
            connector.abort(PairingError::Disposed, &mut actions);
        }
        self.keep_bond = false;
        if let Some(target) = self.target.take() {
            if self.status == Status::Pairing {
                push_action(&mut actions, Action::CancelBond(target.addr));
            }
        }
        self.stop_scanning(&mut actions);
        self.auto_mode = false;
        self.auto_armed = false;
        self.start_pending = false;
        self.set_status(Status::None, &mut actions);
        self.disposed = true;
        actions
    }

    /// Arm a manual pairing attempt for a visible device
    ///
    /// Turns auto mode off for the rest of the pairer's life.
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::DeviceNotFound`] if the address is not visible,
    /// [`PairingError::AlreadyInProgress`] while bonding or connecting.
    pub fn start_pairing(
        &mut self,
        addr: BluetoothAddress,
        now: Instant,
    ) -> Result<Actions, PairingError> {
        self.ensure_active()?;
        if self.status.is_in_progress() {
            return Err(PairingError::AlreadyInProgress);
        }
        let candidate = self
            .visible
            .iter()
            .find(|candidate| candidate.addr == addr)
            .cloned()
            .ok_or(PairingError::DeviceNotFound)?;

        let mut actions = Actions::new();
        self.auto_mode = false;
        self.arm(candidate, true, now, &mut actions);
        Ok(actions)
    }

    /// Drop a device from the visible set
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::Disposed`] after disposal.
    pub fn invalidate_device(
        &mut self,
        addr: BluetoothAddress,
        now: Instant,
    ) -> Result<Actions, PairingError> {
        self.ensure_active()?;
        let mut actions = Actions::new();
        self.remove_device(addr, now, &mut actions);
        Ok(actions)
    }

    /// Empty the visible set
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::Disposed`] after disposal.
    pub fn clear_device_list(&mut self, now: Instant) -> Result<Actions, PairingError> {
        self.ensure_active()?;
        let mut actions = Actions::new();
        self.input_overflow = false;
        if !self.visible.is_empty() {
            self.visible.clear();
            push_action(&mut actions, Action::NotifyListener);
            self.evaluate_auto(now, &mut actions);
        }
        Ok(actions)
    }

    /// Feed one asynchronous event through the state machine
    pub fn handle_event(&mut self, event: Event, now: Instant) -> Actions {
        let mut actions = Actions::new();
        if self.disposed {
            trace!("[PAIRER] Disposed, ignoring {:?}", event);
            return actions;
        }

        match event {
            Event::RadioStateChanged { enabled } => self.on_radio_state(enabled, &mut actions),
            Event::DeviceFound(candidate) => self.on_device_found(candidate, now, &mut actions),
            Event::DeviceLost(addr) => self.remove_device(addr, now, &mut actions),
            Event::BondStateChanged {
                addr,
                state,
                previous,
            } => self.on_bond_state(addr, state, previous, now, &mut actions),
            Event::BondRequestFailed(addr) => {
                if self.status == Status::Pairing && self.is_target(addr) {
                    self.fail(PairingError::BondFailed, true, now, &mut actions);
                }
            }
            Event::ProfileProxyConnected(profile) => {
                if let Some(connector) = self.connector.as_mut() {
                    connector.on_proxy_connected(profile, &mut actions);
                }
            }
            Event::ProfileServiceDisconnected(profile) => {
                self.on_service_disconnected(profile, now, &mut actions);
            }
            Event::ProfileStateChanged {
                profile,
                addr,
                state,
            } => self.on_profile_state(profile, addr, state, now, &mut actions),
            Event::TimerExpired => self.on_timer(now, &mut actions),
            Event::ConnectTimedOut => self.on_connect_timeout(now, &mut actions),
        }
        actions
    }

    fn ensure_active(&self) -> Result<(), PairingError> {
        if self.disposed {
            Err(PairingError::Disposed)
        } else {
            Ok(())
        }
    }

    fn is_target(&self, addr: BluetoothAddress) -> bool {
        self.target.as_ref().is_some_and(|target| target.addr == addr)
    }

    fn set_status(&mut self, status: Status, actions: &mut Actions) {
        if self.status != status {
            debug!("[PAIRER] Status {:?} -> {:?}", self.status, status);
            self.status = status;
            push_action(actions, Action::NotifyListener);
        }
    }

    /// Fresh discovery session: the scanner re-delivers what it still sees
    fn begin_scanning(&mut self, actions: &mut Actions) {
        info!("[PAIRER] Scanning for accessories");
        self.deadline = None;
        self.start_pending = false;
        self.visible.clear();
        self.input_overflow = false;
        self.scanning = true;
        push_action(actions, Action::StartScan(self.criteria));
        self.set_status(Status::Scanning, actions);
    }

    fn resume_scanning(&mut self, actions: &mut Actions) {
        if !self.scanning {
            self.scanning = true;
            push_action(actions, Action::StartScan(self.criteria));
        }
    }

    fn stop_scanning(&mut self, actions: &mut Actions) {
        if self.scanning {
            self.scanning = false;
            push_action(actions, Action::StopScan);
            push_action(actions, Action::StopScanNow);
        }
    }

    fn on_radio_state(&mut self, enabled: bool, actions: &mut Actions) {
        info!("[PAIRER] Radio {}", if enabled { "enabled" } else { "disabled" });
        self.radio_enabled = enabled;
        if enabled && self.start_pending && matches!(self.status, Status::None | Status::Error) {
            self.begin_scanning(actions);
        }
    }

    fn on_device_found(&mut self, candidate: Candidate, now: Instant, actions: &mut Actions) {
        let addr = candidate.addr;
        if let Some(target) = self.target.as_mut().filter(|target| target.addr == addr) {
            target.refresh(&candidate);
        }

        if let Some(entry) = self.visible.iter_mut().find(|entry| entry.addr == addr) {
            entry.refresh(&candidate);
        } else if self.criteria.accepts(candidate.class_of_device) {
            debug!("[PAIRER] Found {} ({})", addr, candidate.class_of_device);
            let input = self.criteria.is_input_candidate(candidate.class_of_device);
            if input && self.visible.is_full() {
                self.evict_non_input();
            }
            if self.visible.push(candidate).is_err() {
                warn!("[PAIRER] Visible set full, dropping {}", addr);
                if input {
                    // An unseen input device makes any auto choice ambiguous
                    self.input_overflow = true;
                    self.evaluate_auto(now, actions);
                }
                return;
            }
        } else {
            trace!(
                "[PAIRER] {} is not a candidate ({})",
                addr,
                candidate.class_of_device
            );
            return;
        }

        push_action(actions, Action::NotifyListener);
        self.evaluate_auto(now, actions);
    }

    /// Free a slot held by an audio sink that is not the target
    fn evict_non_input(&mut self) {
        let evictable = self.visible.iter().position(|entry| {
            !self.criteria.is_input_candidate(entry.class_of_device) && !self.is_target(entry.addr)
        });
        if let Some(index) = evictable {
            let evicted = self.visible.remove(index);
            debug!("[PAIRER] Evicting {} to make room", evicted.addr);
        }
    }

    fn remove_device(&mut self, addr: BluetoothAddress, now: Instant, actions: &mut Actions) {
        let Some(index) = self.visible.iter().position(|entry| entry.addr == addr) else {
            return;
        };
        self.visible.remove(index);
        debug!("[PAIRER] Lost {}", addr);
        push_action(actions, Action::NotifyListener);
        self.evaluate_auto(now, actions);
    }

    /// Auto arbitration: arm only for a lone input candidate
    fn evaluate_auto(&mut self, now: Instant, actions: &mut Actions) {
        let eligible = match self.status {
            Status::Scanning => true,
            Status::WaitingToPair => self.auto_armed,
            _ => false,
        };
        if !self.auto_mode || !eligible {
            return;
        }

        let mut matches = self
            .visible
            .iter()
            .filter(|candidate| self.criteria.is_input_candidate(candidate.class_of_device));
        let lone = match (matches.next(), matches.next()) {
            (Some(candidate), None) if !self.input_overflow => Some(candidate.clone()),
            _ => None,
        };

        match lone {
            Some(candidate) => {
                if self.status == Status::WaitingToPair && self.is_target(candidate.addr) {
                    return;
                }
                self.arm(candidate, false, now, actions);
            }
            None if self.status == Status::WaitingToPair => {
                info!("[PAIRER] Auto candidate no longer unique, disarming");
                self.deadline = None;
                self.target = None;
                self.keep_bond = false;
                self.auto_armed = false;
                self.resume_scanning(actions);
                self.set_status(Status::Scanning, actions);
            }
            None => {}
        }
    }

    fn arm(&mut self, candidate: Candidate, manual: bool, now: Instant, actions: &mut Actions) {
        let delay = if manual {
            self.options.manual_pair_delay
        } else {
            self.options.auto_pair_delay
        };
        info!(
            "[PAIRER] Pairing with {} in {} ms ({})",
            candidate.addr,
            delay.as_millis(),
            if manual { "manual" } else { "auto" }
        );

        self.deadline = Some(Deadline {
            at: now + delay,
            stage: Stage::Bond,
        });
        self.auto_armed = !manual;
        self.keep_bond = candidate.bond_state == BondState::Bonded;
        self.target = Some(candidate);
        if manual {
            self.stop_scanning(actions);
        }
        if self.status == Status::WaitingToPair {
            push_action(actions, Action::NotifyListener);
        } else {
            self.set_status(Status::WaitingToPair, actions);
        }
    }

    fn on_timer(&mut self, now: Instant, actions: &mut Actions) {
        let Some(deadline) = self.deadline else {
            return;
        };
        if now < deadline.at {
            return;
        }
        self.deadline = None;

        match (deadline.stage, self.status) {
            (Stage::Bond, Status::WaitingToPair) => self.begin_bonding(now, actions),
            (Stage::Restart, Status::Error) => self.restart(actions),
            (stage, status) => debug!("[PAIRER] Stale {:?} deadline in {:?}", stage, status),
        }
    }

    fn begin_bonding(&mut self, now: Instant, actions: &mut Actions) {
        self.auto_armed = false;
        self.stop_scanning(actions);
        let Some(target) = self.target.as_ref() else {
            return;
        };
        let addr = target.addr;

        if target.bond_state == BondState::Bonded {
            info!("[PAIRER] {} already bonded", addr);
            self.begin_connecting(now, actions);
            return;
        }

        info!("[PAIRER] Bonding with {}", addr);
        self.set_status(Status::Pairing, actions);
        push_action(actions, Action::CreateBond(addr));
    }

    fn on_bond_state(
        &mut self,
        addr: BluetoothAddress,
        state: BondState,
        previous: BondState,
        now: Instant,
        actions: &mut Actions,
    ) {
        if let Some(entry) = self.visible.iter_mut().find(|entry| entry.addr == addr) {
            entry.bond_state = state;
        }
        let Some(target) = self.target.as_mut().filter(|target| target.addr == addr) else {
            trace!("[PAIRER] Bond event for non-target {}", addr);
            return;
        };
        target.bond_state = state;
        if self.status != Status::Pairing {
            return;
        }

        match (previous, state) {
            (_, BondState::Bonded) => {
                info!("[PAIRER] Bonded with {}", addr);
                self.begin_connecting(now, actions);
            }
            (BondState::Bonding, BondState::None) => {
                self.fail(PairingError::BondFailed, true, now, actions);
            }
            _ => {}
        }
    }

    fn begin_connecting(&mut self, now: Instant, actions: &mut Actions) {
        let Some(target) = self.target.as_ref() else {
            return;
        };
        let addr = target.addr;
        let class = target.class_of_device;

        match Profile::for_class(class, self.options.audio_available) {
            Some(profile) => {
                self.set_status(Status::Connecting, actions);
                self.connector = Some(Connector::open(profile, addr, actions));
            }
            None => {
                warn!("[PAIRER] No connector for {} ({})", addr, class);
                self.fail(PairingError::ConnectorUnavailable, false, now, actions);
            }
        }
    }

    fn on_profile_state(
        &mut self,
        profile: Profile,
        addr: BluetoothAddress,
        state: ProfileConnectionState,
        now: Instant,
        actions: &mut Actions,
    ) {
        let Some(connector) = self.connector.as_mut() else {
            return;
        };
        let outcome = connector.on_state_changed(profile, addr, state, actions);
        self.settle_connection(outcome, now, actions);
    }

    fn on_service_disconnected(&mut self, profile: Profile, now: Instant, actions: &mut Actions) {
        let Some(connector) = self.connector.as_mut() else {
            return;
        };
        let outcome = connector.on_service_disconnected(profile, actions);
        self.settle_connection(outcome, now, actions);
    }

    fn on_connect_timeout(&mut self, now: Instant, actions: &mut Actions) {
        if self.status != Status::Connecting {
            return;
        }
        let Some(connector) = self.connector.as_mut() else {
            return;
        };
        warn!("[PAIRER] Profile connection timed out");
        let outcome = connector.abort(PairingError::ConnectTimeout, actions);
        self.settle_connection(outcome, now, actions);
    }

    fn settle_connection(
        &mut self,
        outcome: Option<Result<(), PairingError>>,
        now: Instant,
        actions: &mut Actions,
    ) {
        let Some(outcome) = outcome else {
            return;
        };
        self.connector = None;
        match outcome {
            Ok(()) => {
                self.keep_bond = false;
                if let Some(target) = self.target.take() {
                    info!("[PAIRER] Connected to {}", target.addr);
                }
                self.set_status(Status::None, actions);
            }
            Err(error) => self.fail(error, true, now, actions),
        }
    }

    /// Enter `Error`: clear the target and its bond, optionally schedule a restart
    fn fail(&mut self, error: PairingError, retry: bool, now: Instant, actions: &mut Actions) {
        if let Some(mut connector) = self.connector.take() {
            connector.abort(error, actions);
        }
        if let Some(target) = self.release_target(actions) {
            warn!("[PAIRER] Pairing with {} failed: {:?}", target.addr, error);
        }
        self.auto_armed = false;
        self.last_error = Some(error);
        self.deadline = retry.then(|| Deadline {
            at: now + self.options.retry_delay,
            stage: Stage::Restart,
        });
        self.set_status(Status::Error, actions);
    }

    /// Clear the target, forgetting its bond unless it was bonded before the attempt
    fn release_target(&mut self, actions: &mut Actions) -> Option<Candidate> {
        let target = self.target.take()?;
        if self.keep_bond {
            debug!("[PAIRER] Keeping existing bond with {}", target.addr);
        } else {
            push_action(actions, Action::RemoveBond(target.addr));
        }
        self.keep_bond = false;
        Some(target)
    }

    fn restart(&mut self, actions: &mut Actions) {
        if self.radio_enabled {
            self.begin_scanning(actions);
        } else {
            self.start_pending = true;
            push_action(actions, Action::EnableRadio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{AUTO_PAIR_DELAY, MANUAL_PAIR_DELAY, RETRY_DELAY};
    use crate::{ClassOfDevice, ProfilePriority};

    const KEYBOARD: u32 = 0x0540;
    const MOUSE: u32 = 0x0580;
    const HEADPHONES: u32 = 0x0418;
    const PHONE: u32 = 0x020C;

    fn addr(n: u8) -> BluetoothAddress {
        BluetoothAddress::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, n])
    }

    fn device(n: u8, class: u32) -> Candidate {
        Candidate::new(addr(n), ClassOfDevice::from_raw(class))
    }

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    fn scanning_pairer(options: PairerOptions) -> DevicePairer {
        let mut pairer = DevicePairer::new(options, true);
        let actions = pairer.start(at(0)).unwrap();
        assert!(actions.contains(&Action::StartScan(CriteriaSet::new(options.audio_available))));
        assert_eq!(pairer.status(), Status::Scanning);
        pairer
    }

    fn assert_target_invariant(pairer: &DevicePairer) {
        let expects_target = matches!(
            pairer.status(),
            Status::WaitingToPair | Status::Pairing | Status::Connecting
        );
        assert_eq!(pairer.target_device().is_some(), expects_target);
    }

    fn bond(pairer: &mut DevicePairer, n: u8, previous: BondState, state: BondState, now: Instant) -> Actions {
        pairer.handle_event(
            Event::BondStateChanged {
                addr: addr(n),
                state,
                previous,
            },
            now,
        )
    }

    /// Drive a manual attempt for device `n` up to `Connecting`
    fn connecting_pairer(n: u8, class: u32) -> DevicePairer {
        let mut pairer = scanning_pairer(PairerOptions {
            audio_available: true,
            ..PairerOptions::default()
        });
        pairer.handle_event(Event::DeviceFound(device(n, class)), at(1));
        pairer.start_pairing(addr(n), at(1)).unwrap();
        pairer.handle_event(Event::TimerExpired, at(1) + MANUAL_PAIR_DELAY);
        bond(&mut pairer, n, BondState::None, BondState::Bonding, at(7));
        bond(&mut pairer, n, BondState::Bonding, BondState::Bonded, at(8));
        assert_eq!(pairer.status(), Status::Connecting);
        pairer
    }

    #[test]
    fn test_single_input_device_pairs_automatically() {
        let mut pairer = scanning_pairer(PairerOptions::default());

        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        assert_eq!(pairer.status(), Status::WaitingToPair);
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(1)));
        assert_eq!(pairer.next_stage_time(), Some(at(1) + AUTO_PAIR_DELAY));
        assert!(pairer.is_scanning());
        assert_target_invariant(&pairer);

        // Early timer wakeups do nothing
        let actions = pairer.handle_event(Event::TimerExpired, at(10));
        assert!(actions.is_empty());
        assert_eq!(pairer.status(), Status::WaitingToPair);

        let actions = pairer.handle_event(Event::TimerExpired, at(16));
        assert_eq!(pairer.status(), Status::Pairing);
        assert!(actions.contains(&Action::StopScan));
        assert!(actions.contains(&Action::StopScanNow));
        assert!(actions.contains(&Action::CreateBond(addr(1))));
        assert_eq!(pairer.next_stage_time(), None);
        assert_target_invariant(&pairer);

        bond(&mut pairer, 1, BondState::None, BondState::Bonding, at(17));
        assert_eq!(pairer.status(), Status::Pairing);

        let actions = bond(&mut pairer, 1, BondState::Bonding, BondState::Bonded, at(18));
        assert_eq!(pairer.status(), Status::Connecting);
        assert!(actions.contains(&Action::AcquireProfileProxy(Profile::Input)));
        assert_target_invariant(&pairer);

        let actions = pairer.handle_event(Event::ProfileProxyConnected(Profile::Input), at(19));
        assert!(actions.contains(&Action::ConnectProfile {
            profile: Profile::Input,
            addr: addr(1)
        }));
        assert!(actions.contains(&Action::SetProfilePriority {
            profile: Profile::Input,
            addr: addr(1),
            priority: ProfilePriority::AutoConnect
        }));

        let actions = pairer.handle_event(
            Event::ProfileStateChanged {
                profile: Profile::Input,
                addr: addr(1),
                state: ProfileConnectionState::Connected,
            },
            at(20),
        );
        assert_eq!(pairer.status(), Status::None);
        assert!(pairer.target_device().is_none());
        assert!(actions.contains(&Action::ReleaseProfileProxy(Profile::Input)));
        assert!(actions.contains(&Action::NotifyListener));
        assert_target_invariant(&pairer);
    }

    #[test]
    fn test_two_input_devices_stay_scanning() {
        let mut pairer = scanning_pairer(PairerOptions::default());

        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        assert_eq!(pairer.status(), Status::WaitingToPair);

        // A second match before the timer fires disarms
        pairer.handle_event(Event::DeviceFound(device(2, MOUSE)), at(2));
        assert_eq!(pairer.status(), Status::Scanning);
        assert!(pairer.target_device().is_none());
        assert_eq!(pairer.next_stage_time(), None);
        assert_target_invariant(&pairer);

        // Stale wakeup for the cancelled arm
        pairer.handle_event(Event::TimerExpired, at(16));
        assert_eq!(pairer.status(), Status::Scanning);
    }

    #[test]
    fn test_audio_device_does_not_count_for_auto_selection() {
        let mut pairer = scanning_pairer(PairerOptions {
            audio_available: true,
            ..PairerOptions::default()
        });

        pairer.handle_event(Event::DeviceFound(device(1, HEADPHONES)), at(1));
        assert_eq!(pairer.status(), Status::Scanning);
        assert_eq!(pairer.visible_devices().len(), 1);

        pairer.handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(2));
        assert_eq!(pairer.status(), Status::WaitingToPair);
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(2)));
    }

    #[test]
    fn test_non_candidates_are_ignored() {
        let mut pairer = scanning_pairer(PairerOptions::default());

        let actions = pairer.handle_event(Event::DeviceFound(device(1, PHONE)), at(1));
        assert!(actions.is_empty());
        // Audio criteria are absent without the audio service
        pairer.handle_event(Event::DeviceFound(device(2, HEADPHONES)), at(1));
        assert!(pairer.visible_devices().is_empty());
    }

    #[test]
    fn test_cancel_while_waiting_to_pair() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(1));
        pairer.start_pairing(addr(1), at(2)).unwrap();
        assert!(!pairer.is_scanning());

        let actions = pairer.cancel_pairing().unwrap();
        assert_eq!(pairer.status(), Status::None);
        assert!(pairer.target_device().is_none());
        assert_eq!(pairer.next_stage_time(), None);
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
        assert!(actions.contains(&Action::StartScan(CriteriaSet::new(false))));
        assert!(pairer.is_scanning());
        assert!(!pairer.is_auto_mode());
        assert_target_invariant(&pairer);
    }

    #[test]
    fn test_cancel_auto_arm_keeps_scanner_running() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));

        let actions = pairer.cancel_pairing().unwrap();
        assert_eq!(pairer.status(), Status::None);
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
        // Auto arm never stopped the scanner, so there is nothing to restart
        assert!(!actions.iter().any(|a| matches!(a, Action::StartScan(_))));
        assert!(pairer.is_scanning());

        // Auto mode is off for good
        pairer.handle_event(Event::DeviceLost(addr(1)), at(2));
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(3));
        assert_eq!(pairer.status(), Status::None);
    }

    #[test]
    fn test_cancel_while_scanning_disables_auto_mode() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        let actions = pairer.cancel_pairing().unwrap();
        assert!(actions.is_empty());
        assert_eq!(pairer.status(), Status::Scanning);

        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        assert_eq!(pairer.status(), Status::Scanning);
    }

    #[test]
    fn test_cancel_is_rejected_while_pairing_or_connecting() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));
        assert_eq!(pairer.status(), Status::Pairing);

        assert_eq!(pairer.cancel_pairing(), Err(PairingError::AlreadyInProgress));
        assert_eq!(pairer.status(), Status::Pairing);
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(1)));

        let mut pairer = connecting_pairer(3, KEYBOARD);
        assert_eq!(pairer.cancel_pairing(), Err(PairingError::AlreadyInProgress));
        assert_eq!(pairer.status(), Status::Connecting);
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(3)));
    }

    #[test]
    fn test_bond_regression_retries_after_delay() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(1));
        pairer.start_pairing(addr(1), at(2)).unwrap();
        assert_eq!(pairer.next_stage_time(), Some(at(2) + MANUAL_PAIR_DELAY));

        pairer.handle_event(Event::TimerExpired, at(7));
        assert_eq!(pairer.status(), Status::Pairing);

        bond(&mut pairer, 1, BondState::None, BondState::Bonding, at(8));
        let actions = bond(&mut pairer, 1, BondState::Bonding, BondState::None, at(9));
        assert_eq!(pairer.status(), Status::Error);
        assert!(pairer.target_device().is_none());
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
        assert_eq!(pairer.last_error(), Some(PairingError::BondFailed));
        assert_eq!(pairer.next_stage_time(), Some(at(9) + RETRY_DELAY));
        assert_target_invariant(&pairer);

        let actions = pairer.handle_event(Event::TimerExpired, at(14));
        assert_eq!(pairer.status(), Status::Scanning);
        assert!(actions.contains(&Action::StartScan(CriteriaSet::new(false))));
        assert!(pairer.visible_devices().is_empty());
        assert_eq!(pairer.next_stage_time(), None);
    }

    #[test]
    fn test_bond_request_rejected() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));

        // A rejection for someone else is not ours
        pairer.handle_event(Event::BondRequestFailed(addr(9)), at(16));
        assert_eq!(pairer.status(), Status::Pairing);

        let actions = pairer.handle_event(Event::BondRequestFailed(addr(1)), at(16));
        assert_eq!(pairer.status(), Status::Error);
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
        assert_eq!(pairer.last_error(), Some(PairingError::BondFailed));
    }

    #[test]
    fn test_events_for_other_addresses_cause_no_transition() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));

        let actions = bond(&mut pairer, 2, BondState::Bonding, BondState::Bonded, at(17));
        assert!(actions.is_empty());
        bond(&mut pairer, 2, BondState::Bonding, BondState::None, at(17));
        assert_eq!(pairer.status(), Status::Pairing);

        let mut pairer = connecting_pairer(3, KEYBOARD);
        pairer.handle_event(Event::ProfileProxyConnected(Profile::Input), at(9));
        let actions = pairer.handle_event(
            Event::ProfileStateChanged {
                profile: Profile::Input,
                addr: addr(4),
                state: ProfileConnectionState::Disconnected,
            },
            at(10),
        );
        assert!(actions.is_empty());
        assert_eq!(pairer.status(), Status::Connecting);
    }

    #[test]
    fn test_discovery_churn_cannot_interrupt_pairing() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));

        pairer.handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(17));
        pairer.handle_event(Event::DeviceLost(addr(1)), at(17));
        pairer.clear_device_list(at(17)).unwrap();
        assert_eq!(pairer.status(), Status::Pairing);
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(1)));
    }

    #[test]
    fn test_full_visible_set_makes_room_for_input_devices() {
        let mut pairer = scanning_pairer(PairerOptions {
            audio_available: true,
            ..PairerOptions::default()
        });
        for n in 1..MAX_VISIBLE_DEVICES as u8 {
            pairer.handle_event(Event::DeviceFound(device(n, HEADPHONES)), at(1));
        }
        pairer.handle_event(Event::DeviceFound(device(0x0A, KEYBOARD)), at(2));
        assert_eq!(pairer.status(), Status::WaitingToPair);
        assert_eq!(pairer.visible_devices().len(), MAX_VISIBLE_DEVICES);

        // A second input device must still be seen and break the tie
        let actions = pairer.handle_event(Event::DeviceFound(device(0x0B, MOUSE)), at(3));
        assert!(actions.contains(&Action::NotifyListener));
        assert_eq!(pairer.status(), Status::Scanning);
        assert_eq!(pairer.target_device(), None);
        assert_eq!(pairer.next_stage_time(), None);
        assert_eq!(pairer.visible_devices().len(), MAX_VISIBLE_DEVICES);
        assert!(pairer.visible_devices().iter().any(|d| d.addr == addr(0x0B)));
        assert!(!pairer.visible_devices().iter().any(|d| d.addr == addr(1)));
    }

    #[test]
    fn test_dropped_input_device_blocks_auto_selection() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        for n in 1..=MAX_VISIBLE_DEVICES as u8 {
            pairer.handle_event(Event::DeviceFound(device(n, KEYBOARD)), at(1));
        }
        pairer.handle_event(Event::DeviceFound(device(0x20, KEYBOARD)), at(2));
        assert_eq!(pairer.visible_devices().len(), MAX_VISIBLE_DEVICES);

        // One stored keyboard left, but the dropped one may still be nearby
        for n in 2..=MAX_VISIBLE_DEVICES as u8 {
            pairer.handle_event(Event::DeviceLost(addr(n)), at(3));
        }
        assert_eq!(pairer.visible_devices().len(), 1);
        assert_eq!(pairer.status(), Status::Scanning);
        assert_target_invariant(&pairer);

        // A cleared list starts a fresh count
        pairer.clear_device_list(at(4)).unwrap();
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(5));
        assert_eq!(pairer.status(), Status::WaitingToPair);
    }

    #[test]
    fn test_visible_set_has_no_duplicates() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.disable_auto_pairing().unwrap();

        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD).with_rssi(-40)), at(1));
        pairer.handle_event(Event::DeviceFound(device(2, MOUSE)), at(1));
        pairer.handle_event(Event::DeviceLost(addr(1)), at(2));
        pairer.handle_event(Event::DeviceLost(addr(1)), at(2));
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(3));
        pairer.handle_event(Event::DeviceFound(device(2, MOUSE)), at(3));

        let visible = pairer.visible_devices();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].addr, addr(2));
        assert_eq!(visible[1].addr, addr(1));
    }

    #[test]
    fn test_device_found_refreshes_entry() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));

        let named = device(1, KEYBOARD)
            .with_name(heapless::String::try_from("Keys").unwrap())
            .with_rssi(-55);
        let actions = pairer.handle_event(Event::DeviceFound(named), at(2));
        assert!(actions.contains(&Action::NotifyListener));
        assert_eq!(pairer.visible_devices()[0].name.as_deref(), Some("Keys"));
        assert_eq!(
            pairer.target_device().and_then(|t| t.name.as_deref()),
            Some("Keys")
        );
        // Re-reporting the armed target leaves its deadline alone
        assert_eq!(pairer.next_stage_time(), Some(at(1) + AUTO_PAIR_DELAY));
    }

    #[test]
    fn test_losing_auto_target_disarms_and_refinding_rearms() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));

        pairer.handle_event(Event::DeviceLost(addr(1)), at(5));
        assert_eq!(pairer.status(), Status::Scanning);
        assert!(pairer.target_device().is_none());

        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(6));
        assert_eq!(pairer.status(), Status::WaitingToPair);
        assert_eq!(pairer.next_stage_time(), Some(at(6) + AUTO_PAIR_DELAY));
    }

    #[test]
    fn test_ambiguity_resolving_rearms() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(1));
        assert_eq!(pairer.status(), Status::Scanning);

        pairer.invalidate_device(addr(1), at(3)).unwrap();
        assert_eq!(pairer.status(), Status::WaitingToPair);
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(2)));

        pairer.clear_device_list(at(4)).unwrap();
        assert_eq!(pairer.status(), Status::Scanning);
        assert_target_invariant(&pairer);
    }

    #[test]
    fn test_start_pairing_requires_visible_device() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        assert_eq!(
            pairer.start_pairing(addr(1), at(1)),
            Err(PairingError::DeviceNotFound)
        );
        assert!(pairer.is_auto_mode());
        assert_eq!(pairer.status(), Status::Scanning);
    }

    #[test]
    fn test_manual_pairing_replaces_auto_arm() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.disable_auto_pairing().unwrap();
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::DeviceFound(device(2, MOUSE)), at(1));

        pairer.start_pairing(addr(1), at(2)).unwrap();
        let actions = pairer.start_pairing(addr(2), at(3)).unwrap();
        assert!(actions.contains(&Action::NotifyListener));
        assert_eq!(pairer.target_device().map(|t| t.addr), Some(addr(2)));
        assert_eq!(pairer.next_stage_time(), Some(at(3) + MANUAL_PAIR_DELAY));
        assert_eq!(pairer.phase_description(), "Waiting to pair");
    }

    #[test]
    fn test_radio_enabled_before_scanning() {
        let mut pairer = DevicePairer::new(PairerOptions::default(), false);

        let actions = pairer.start(at(0)).unwrap();
        assert_eq!(actions.as_slice(), &[Action::EnableRadio]);
        assert_eq!(pairer.status(), Status::None);

        let actions = pairer.handle_event(Event::RadioStateChanged { enabled: true }, at(1));
        assert_eq!(pairer.status(), Status::Scanning);
        assert!(actions.contains(&Action::StartScan(CriteriaSet::new(false))));

        // A later radio toggle does not restart discovery
        let actions = pairer.handle_event(Event::RadioStateChanged { enabled: true }, at(2));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_restart_waits_for_radio() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));
        pairer.handle_event(Event::BondRequestFailed(addr(1)), at(16));
        pairer.handle_event(Event::RadioStateChanged { enabled: false }, at(17));

        let actions = pairer.handle_event(Event::TimerExpired, at(21));
        assert_eq!(actions.as_slice(), &[Action::EnableRadio]);
        assert_eq!(pairer.status(), Status::Error);

        pairer.handle_event(Event::RadioStateChanged { enabled: true }, at(22));
        assert_eq!(pairer.status(), Status::Scanning);
    }

    #[test]
    fn test_already_bonded_target_skips_bonding() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        let bonded = device(1, KEYBOARD).with_bond_state(BondState::Bonded);
        pairer.handle_event(Event::DeviceFound(bonded), at(1));

        let actions = pairer.handle_event(Event::TimerExpired, at(16));
        assert_eq!(pairer.status(), Status::Connecting);
        assert!(!actions.iter().any(|a| matches!(a, Action::CreateBond(_))));
        assert!(actions.contains(&Action::AcquireProfileProxy(Profile::Input)));
    }

    #[test]
    fn test_cancel_keeps_bond_made_before_the_attempt() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        let bonded = device(1, KEYBOARD).with_bond_state(BondState::Bonded);
        pairer.handle_event(Event::DeviceFound(bonded), at(1));
        assert_eq!(pairer.status(), Status::WaitingToPair);

        let actions = pairer.cancel_pairing().unwrap();
        assert_eq!(pairer.status(), Status::None);
        assert!(!actions.iter().any(|a| matches!(a, Action::RemoveBond(_))));
        assert_target_invariant(&pairer);
    }

    #[test]
    fn test_failure_keeps_bond_made_before_the_attempt() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        let bonded = device(1, KEYBOARD).with_bond_state(BondState::Bonded);
        pairer.handle_event(Event::DeviceFound(bonded), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));
        assert_eq!(pairer.status(), Status::Connecting);

        let actions = pairer.handle_event(Event::ConnectTimedOut, at(31));
        assert_eq!(pairer.status(), Status::Error);
        assert_eq!(pairer.last_error(), Some(PairingError::ConnectTimeout));
        assert!(!actions.iter().any(|a| matches!(a, Action::RemoveBond(_))));

        // A later attempt on a fresh device still cleans up its own bond
        pairer.handle_event(Event::TimerExpired, at(31) + RETRY_DELAY);
        pairer.handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(40));
        let actions = pairer.cancel_pairing().unwrap();
        assert!(actions.contains(&Action::RemoveBond(addr(2))));
    }

    #[test]
    fn test_bond_events_update_known_bond_state() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        bond(&mut pairer, 1, BondState::None, BondState::Bonded, at(2));
        assert_eq!(pairer.visible_devices()[0].bond_state, BondState::Bonded);
        assert_eq!(pairer.status(), Status::WaitingToPair);

        pairer.handle_event(Event::TimerExpired, at(16));
        assert_eq!(pairer.status(), Status::Connecting);
    }

    #[test]
    fn test_connector_unavailable_does_not_retry() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        // The device re-reports with a class no connector handles
        pairer.handle_event(Event::DeviceFound(device(1, PHONE)), at(2));
        pairer.start_pairing(addr(1), at(3)).unwrap();
        pairer.handle_event(Event::TimerExpired, at(8));

        let actions = bond(&mut pairer, 1, BondState::Bonding, BondState::Bonded, at(9));
        assert_eq!(pairer.status(), Status::Error);
        assert_eq!(pairer.last_error(), Some(PairingError::ConnectorUnavailable));
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
        assert_eq!(pairer.next_stage_time(), None);
        assert_eq!(pairer.phase_description(), "Error");
        assert_target_invariant(&pairer);
    }

    #[test]
    fn test_audio_connector_failure_retries() {
        let mut pairer = connecting_pairer(1, HEADPHONES);
        pairer.handle_event(Event::ProfileProxyConnected(Profile::Audio), at(9));

        let actions = pairer.handle_event(
            Event::ProfileStateChanged {
                profile: Profile::Audio,
                addr: addr(1),
                state: ProfileConnectionState::Disconnected,
            },
            at(10),
        );
        assert_eq!(pairer.status(), Status::Error);
        assert_eq!(pairer.last_error(), Some(PairingError::ProfileConnectFailed));
        assert!(actions.contains(&Action::UnsubscribeProfileState {
            profile: Profile::Audio,
            addr: addr(1)
        }));
        assert!(actions.contains(&Action::ReleaseProfileProxy(Profile::Audio)));
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
        assert_eq!(pairer.next_stage_time(), Some(at(10) + RETRY_DELAY));
        assert_eq!(pairer.phase_description(), "Error, retrying shortly");

        // Late broadcasts for the finished attempt change nothing
        let actions = pairer.handle_event(
            Event::ProfileStateChanged {
                profile: Profile::Audio,
                addr: addr(1),
                state: ProfileConnectionState::Connected,
            },
            at(11),
        );
        assert!(actions.is_empty());
        assert_eq!(pairer.status(), Status::Error);
    }

    #[test]
    fn test_profile_service_loss_fails_connection() {
        let mut pairer = connecting_pairer(1, KEYBOARD);
        let actions = pairer.handle_event(Event::ProfileServiceDisconnected(Profile::Input), at(9));
        assert_eq!(pairer.status(), Status::Error);
        assert_eq!(
            pairer.last_error(),
            Some(PairingError::ProfileServiceDisconnected)
        );
        assert!(actions.contains(&Action::ReleaseProfileProxy(Profile::Input)));
    }

    #[test]
    fn test_connect_timeout_fails_connection() {
        let mut pairer = connecting_pairer(1, KEYBOARD);
        pairer.handle_event(Event::ProfileProxyConnected(Profile::Input), at(9));

        let actions = pairer.handle_event(Event::ConnectTimedOut, at(24));
        assert_eq!(pairer.status(), Status::Error);
        assert_eq!(pairer.last_error(), Some(PairingError::ConnectTimeout));
        assert!(actions.contains(&Action::UnsubscribeProfileState {
            profile: Profile::Input,
            addr: addr(1)
        }));
        assert!(actions.contains(&Action::RemoveBond(addr(1))));
    }

    #[test]
    fn test_start_rejected_while_in_progress() {
        let mut pairer = connecting_pairer(1, KEYBOARD);
        assert_eq!(pairer.start(at(9)), Err(PairingError::AlreadyInProgress));
        assert_eq!(
            pairer.start_pairing(addr(1), at(9)),
            Err(PairingError::AlreadyInProgress)
        );
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut pairer = connecting_pairer(1, KEYBOARD);
        pairer.handle_event(Event::ProfileProxyConnected(Profile::Input), at(9));

        let actions = pairer.dispose();
        assert!(pairer.is_disposed());
        assert_eq!(pairer.status(), Status::None);
        assert!(pairer.target_device().is_none());
        assert!(actions.contains(&Action::ReleaseProfileProxy(Profile::Input)));
        assert!(actions.contains(&Action::UnsubscribeProfileState {
            profile: Profile::Input,
            addr: addr(1)
        }));

        assert!(pairer.dispose().is_empty());
        assert_eq!(pairer.start(at(10)), Err(PairingError::Disposed));
        assert_eq!(pairer.cancel_pairing(), Err(PairingError::Disposed));
        assert!(
            pairer
                .handle_event(Event::DeviceFound(device(2, KEYBOARD)), at(10))
                .is_empty()
        );
    }

    #[test]
    fn test_dispose_while_pairing_cancels_bond_and_scan() {
        let mut pairer = scanning_pairer(PairerOptions::default());
        let actions = pairer.dispose();
        assert!(actions.contains(&Action::StopScan));
        assert!(actions.contains(&Action::StopScanNow));

        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        pairer.handle_event(Event::TimerExpired, at(16));
        let actions = pairer.dispose();
        assert!(actions.contains(&Action::CancelBond(addr(1))));
        assert_eq!(pairer.next_stage_time(), None);
    }

    #[test]
    fn test_status_descriptions() {
        assert_eq!(Status::None.description(), "Idle");
        assert_eq!(Status::Scanning.description(), "Searching for accessories");
        assert!(Status::Pairing.is_in_progress());
        assert!(Status::Connecting.is_in_progress());
        assert!(!Status::WaitingToPair.is_in_progress());

        let mut pairer = scanning_pairer(PairerOptions::default());
        pairer.handle_event(Event::DeviceFound(device(1, KEYBOARD)), at(1));
        assert_eq!(pairer.phase_description(), "Waiting to pair automatically");
    }
}
