//! Class of Device (`CoD`) for candidate classification
//!
//! The Class of Device is a 24-bit field reported during discovery:
//! - Major Service Classes (bits 23-13)
//! - Major Device Class (bits 12-8)
//! - Minor Device Class (bits 7-2)
//! - Format Type (bits 1-0, always 0b00)
//!
//! Candidate criteria match on the major class and on minor-class bits. For
//! Peripheral devices the minor class is itself a bit field (keyboard/pointing
//! in the upper two bits, a "feel" nibble below), so criteria work directly on
//! the raw value masked with [`MINOR_CLASS_MASK`].
//!
//! ```rust
//! use pairbird::{ClassOfDevice, MajorDeviceClass};
//!
//! let cod = ClassOfDevice::from_raw(0x0000_0540);
//! assert_eq!(cod.major_device_class(), MajorDeviceClass::Peripheral);
//! assert!(cod.has_minor_bits(pairbird::class_of_device::PERIPHERAL_KEYBOARD));
//! ```

/// Bits 7-2 of the raw value, the minor device class in place
pub const MINOR_CLASS_MASK: u32 = 0x0000_00FC;

/// Peripheral: keyboard bit (raw-value position)
pub const PERIPHERAL_KEYBOARD: u32 = 0x40;
/// Peripheral: pointing device bit (raw-value position)
pub const PERIPHERAL_POINTING: u32 = 0x80;
/// Peripheral: joystick feel bits (raw-value position)
pub const PERIPHERAL_JOYSTICK: u32 = 0x04;
/// Peripheral: gamepad feel bits (raw-value position)
pub const PERIPHERAL_GAMEPAD: u32 = 0x08;
/// Peripheral: remote control feel bits (raw-value position)
pub const PERIPHERAL_REMOTE: u32 = 0x0C;

/// Audio/Video minor value: wearable headset
pub const AUDIO_WEARABLE_HEADSET: u8 = 0x01;
/// Audio/Video minor value: hands-free device
pub const AUDIO_HANDSFREE: u8 = 0x02;
/// Audio/Video minor value: loudspeaker
pub const AUDIO_LOUDSPEAKER: u8 = 0x05;
/// Audio/Video minor value: headphones
pub const AUDIO_HEADPHONES: u8 = 0x06;
/// Audio/Video minor value: portable audio
pub const AUDIO_PORTABLE: u8 = 0x07;
/// Audio/Video minor value: car audio
pub const AUDIO_CAR: u8 = 0x08;
/// Audio/Video minor value: HiFi audio device
pub const AUDIO_HIFI: u8 = 0x0A;

/// Class of Device (`CoD`) indicating device type and capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClassOfDevice {
    raw: u32,
}

impl ClassOfDevice {
    /// Create a `ClassOfDevice` from raw 24-bit value
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw: raw & 0xFF_FFFF,
        }
    }

    /// Get the raw 24-bit value
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// Get the Major Device Class (bits 12-8)
    #[must_use]
    pub fn major_device_class(&self) -> MajorDeviceClass {
        MajorDeviceClass::from_raw(((self.raw >> 8) & 0x1F) as u8)
    }

    /// Get the Minor Device Class value (bits 7-2, shifted down)
    #[must_use]
    pub const fn minor_device_class(&self) -> u8 {
        ((self.raw >> 2) & 0x3F) as u8
    }

    /// Minor-class bits left in their raw-value position
    #[must_use]
    pub const fn minor_bits(&self) -> u32 {
        self.raw & MINOR_CLASS_MASK
    }

    /// True if any of `mask` (raw-value positions) is set in the minor class
    #[must_use]
    pub const fn has_minor_bits(&self, mask: u32) -> bool {
        self.minor_bits() & mask != 0
    }

    /// Human-readable minor class label, where one is defined
    #[must_use]
    pub fn minor_description(&self) -> Option<&'static str> {
        let minor = self.minor_device_class();
        match self.major_device_class() {
            MajorDeviceClass::Peripheral => match ((minor >> 4) & 0x3, minor & 0xF) {
                (1, _) => Some("Keyboard"),
                (2, _) => Some("Pointing device"),
                (3, _) => Some("Combo keyboard/pointing device"),
                (0, 0) => Some("Uncategorized"),
                (0, 1) => Some("Joystick"),
                (0, 2) => Some("Gamepad"),
                (0, 3) => Some("Remote control"),
                (0, 4) => Some("Sensing device"),
                _ => None,
            },
            MajorDeviceClass::AudioVideo => match minor {
                AUDIO_WEARABLE_HEADSET => Some("Wearable headset device"),
                AUDIO_HANDSFREE => Some("Hands-free device"),
                AUDIO_LOUDSPEAKER => Some("Loudspeaker"),
                AUDIO_HEADPHONES => Some("Headphones"),
                AUDIO_PORTABLE => Some("Portable audio"),
                AUDIO_CAR => Some("Car audio"),
                AUDIO_HIFI => Some("HiFi audio device"),
                0x0F => Some("Video display and loudspeaker"),
                _ => None,
            },
            _ => None,
        }
    }
}

impl core::fmt::Display for ClassOfDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.major_device_class().description())?;
        if let Some(minor) = self.minor_description() {
            write!(f, " ({minor})")?;
        }
        Ok(())
    }
}

/// Major Device Class enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MajorDeviceClass {
    /// Miscellaneous devices
    Miscellaneous,
    /// Computer devices (desktop, server, laptop, etc.)
    Computer,
    /// Phone devices (cellular, cordless, smartphone, etc.)
    Phone,
    /// LAN/Network Access Point devices
    LanNetworkAccessPoint,
    /// Audio/Video devices (headphones, speakers, microphones, etc.)
    AudioVideo,
    /// Peripheral devices (keyboard, mouse, gamepad, remote)
    Peripheral,
    /// Imaging devices (display, camera, scanner, printer)
    Imaging,
    /// Wearable devices (watch, glasses, etc.)
    Wearable,
    /// Toy devices (robot, vehicle, controller, etc.)
    Toy,
    /// Health devices (monitor, scale, etc.)
    Health,
    /// Uncategorized devices
    Uncategorized,
    /// Reserved or unknown device class
    Reserved(u8),
}

impl MajorDeviceClass {
    /// Create `MajorDeviceClass` from raw 5-bit value
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Miscellaneous,
            0x01 => Self::Computer,
            0x02 => Self::Phone,
            0x03 => Self::LanNetworkAccessPoint,
            0x04 => Self::AudioVideo,
            0x05 => Self::Peripheral,
            0x06 => Self::Imaging,
            0x07 => Self::Wearable,
            0x08 => Self::Toy,
            0x09 => Self::Health,
            0x1F => Self::Uncategorized,
            other => Self::Reserved(other),
        }
    }

    /// Get human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Miscellaneous => "Miscellaneous",
            Self::Computer => "Computer",
            Self::Phone => "Phone",
            Self::LanNetworkAccessPoint => "LAN/Network Access Point",
            Self::AudioVideo => "Audio/Video",
            Self::Peripheral => "Peripheral",
            Self::Imaging => "Imaging",
            Self::Wearable => "Wearable",
            Self::Toy => "Toy",
            Self::Health => "Health",
            Self::Uncategorized => "Uncategorized",
            Self::Reserved(_) => "Reserved",
        }
    }
}
