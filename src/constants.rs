//! `Pairbird` Constants
//!
//! Default stage delays, capacities and queue depths used throughout the crate.
//! The delays are defaults for [`crate::PairerOptions`], not protocol invariants.

use embassy_time::Duration;

/// Delay between auto-selecting a lone candidate and starting to bond with it
pub const AUTO_PAIR_DELAY: Duration = Duration::from_secs(15);

/// Delay between a manual pairing request and starting to bond
pub const MANUAL_PAIR_DELAY: Duration = Duration::from_secs(5);

/// Delay between an `Error` status and the automatic return to scanning
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on the `Connecting` phase, enforced by the processor
pub const PROFILE_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum number of candidates held in the visible set
pub const MAX_VISIBLE_DEVICES: usize = 8;

/// Maximum number of actions produced by a single state transition
pub const MAX_ACTIONS: usize = 8;

/// Depth of the request, response and event channels
pub const MAX_CHANNELS: usize = 8;

/// Maximum device name length in bytes
pub const MAX_DEVICE_NAME_LENGTH: usize = 32;
