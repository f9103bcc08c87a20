use crate::PairingError;

/// A Bluetooth Device Address (`BD_ADDR`)
///
/// The address doubles as the device handle for every transport request the
/// pairer issues (bond creation, profile connect, subscriptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
    /// Create a new Bluetooth address from bytes
    #[must_use]
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Get the raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Format the address as a colon-separated upper-case hex string
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";

        let mut result = heapless::String::new();
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                result.push(':').ok();
            }
            result.push(char::from(HEX[usize::from(byte >> 4)])).ok();
            result.push(char::from(HEX[usize::from(byte & 0x0F)])).ok();
        }
        result
    }

    /// Parse a Bluetooth address from a colon-separated hex string
    ///
    /// # Errors
    /// Returns [`PairingError::InvalidAddress`] if the string is not exactly
    /// six colon-separated two-digit hex groups.
    pub fn from_hex(hex: &str) -> Result<Self, PairingError> {
        if hex.len() != 17 {
            return Err(PairingError::InvalidAddress);
        }

        let mut bytes = [0u8; 6];
        let mut groups = hex.split(':');
        for slot in &mut bytes {
            let group = groups.next().ok_or(PairingError::InvalidAddress)?;
            if group.len() != 2 {
                return Err(PairingError::InvalidAddress);
            }
            *slot = u8::from_str_radix(group, 16).map_err(|_| PairingError::InvalidAddress)?;
        }
        if groups.next().is_some() {
            return Err(PairingError::InvalidAddress);
        }
        Ok(Self(bytes))
    }
}

impl core::fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.format_hex().as_str())
    }
}

impl From<[u8; 6]> for BluetoothAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<BluetoothAddress> for [u8; 6] {
    fn from(addr: BluetoothAddress) -> Self {
        addr.0
    }
}

impl TryFrom<&str> for BluetoothAddress {
    type Error = PairingError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        BluetoothAddress::from_hex(hex)
    }
}

impl TryFrom<&[u8]> for BluetoothAddress {
    type Error = PairingError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let addr: [u8; 6] = bytes.try_into().map_err(|_| PairingError::InvalidAddress)?;
        Ok(Self(addr))
    }
}
