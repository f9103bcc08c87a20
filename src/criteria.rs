//! Candidate criteria
//!
//! Pure predicates deciding whether a discovered device is worth offering for
//! pairing. The scanner accepts a device when *any* criterion in the set matches;
//! auto-pairing arbitration only counts matches of the input criterion.

use crate::class_of_device::{
    AUDIO_CAR, AUDIO_HANDSFREE, AUDIO_HEADPHONES, AUDIO_HIFI, AUDIO_LOUDSPEAKER, AUDIO_PORTABLE,
    AUDIO_WEARABLE_HEADSET, PERIPHERAL_GAMEPAD, PERIPHERAL_JOYSTICK, PERIPHERAL_KEYBOARD,
    PERIPHERAL_POINTING, PERIPHERAL_REMOTE,
};
use crate::{ClassOfDevice, MajorDeviceClass};

/// A device-class predicate
pub trait CandidateCriteria {
    /// True if the major device class is one this criterion covers
    fn matches_major_class(&self, major: MajorDeviceClass) -> bool;

    /// True if the minor class bits are acceptable within the major class
    fn matches_minor_class(&self, class: ClassOfDevice) -> bool;

    /// Major and minor checks combined
    fn is_candidate(&self, class: ClassOfDevice) -> bool {
        self.matches_major_class(class.major_device_class()) && self.matches_minor_class(class)
    }
}

/// Keyboards, pointing devices, joysticks, gamepads and remotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputDeviceCriteria;

impl InputDeviceCriteria {
    /// Accepted minor bits, in raw Class of Device position
    pub const MINOR_MASK: u32 = PERIPHERAL_POINTING
        | PERIPHERAL_JOYSTICK
        | PERIPHERAL_GAMEPAD
        | PERIPHERAL_KEYBOARD
        | PERIPHERAL_REMOTE;
}

impl CandidateCriteria for InputDeviceCriteria {
    fn matches_major_class(&self, major: MajorDeviceClass) -> bool {
        major == MajorDeviceClass::Peripheral
    }

    fn matches_minor_class(&self, class: ClassOfDevice) -> bool {
        class.has_minor_bits(Self::MINOR_MASK)
    }
}

/// Headsets, speakers and other audio sinks reachable over A2DP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioDeviceCriteria;

impl AudioDeviceCriteria {
    /// Accepted minor values, one bit per value (`1 << minor`)
    pub const MINOR_MASK: u64 = (1 << AUDIO_WEARABLE_HEADSET)
        | (1 << AUDIO_HANDSFREE)
        | (1 << AUDIO_LOUDSPEAKER)
        | (1 << AUDIO_HEADPHONES)
        | (1 << AUDIO_PORTABLE)
        | (1 << AUDIO_CAR)
        | (1 << AUDIO_HIFI);
}

impl CandidateCriteria for AudioDeviceCriteria {
    fn matches_major_class(&self, major: MajorDeviceClass) -> bool {
        major == MajorDeviceClass::AudioVideo
    }

    fn matches_minor_class(&self, class: ClassOfDevice) -> bool {
        Self::MINOR_MASK & (1u64 << class.minor_device_class()) != 0
    }
}

/// The immutable set of criteria a pairer is built with
///
/// Always carries the input criterion; the audio criterion is present only when
/// the host offers the audio profile service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CriteriaSet {
    input: InputDeviceCriteria,
    audio: Option<AudioDeviceCriteria>,
}

impl CriteriaSet {
    /// Build the set for a host, with or without audio support
    #[must_use]
    pub const fn new(audio_available: bool) -> Self {
        Self {
            input: InputDeviceCriteria,
            audio: if audio_available {
                Some(AudioDeviceCriteria)
            } else {
                None
            },
        }
    }

    /// The input criterion used for auto-pairing arbitration
    #[must_use]
    pub fn input(&self) -> &InputDeviceCriteria {
        &self.input
    }

    /// The audio criterion, if the host supports it
    #[must_use]
    pub fn audio(&self) -> Option<&AudioDeviceCriteria> {
        self.audio.as_ref()
    }

    /// Criteria in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = &dyn CandidateCriteria> {
        core::iter::once(&self.input as &dyn CandidateCriteria)
            .chain(self.audio.iter().map(|a| a as &dyn CandidateCriteria))
    }

    /// True if any criterion accepts the class
    #[must_use]
    pub fn accepts(&self, class: ClassOfDevice) -> bool {
        self.iter().any(|criteria| criteria.is_candidate(class))
    }

    /// True if the input criterion accepts the class
    #[must_use]
    pub fn is_input_candidate(&self, class: ClassOfDevice) -> bool {
        self.input.is_candidate(class)
    }
}
