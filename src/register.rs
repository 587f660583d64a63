//! Register kinds held by a Modbus data area
//!
//! Four concrete types model the four Modbus primary tables:
//!
//! | Type | Table | Value | Client-writable |
//! |------|-------|-------|-----------------|
//! | [`Coil`] | Coils | bit | yes (FC05/FC15) |
//! | [`DiscreteInput`] | Discrete Inputs | bit | no |
//! | [`HoldingRegister`] | Holding Registers | 16-bit word | yes (FC06/FC16) |
//! | [`InputRegister`] | Input Registers | 16-bit word | no |
//!
//! Read-only here means read-only for Modbus clients; the owning
//! application updates discrete inputs and input registers through the
//! data area. The `Display` impls render the conventional reference
//! notation (table prefix digit plus zero-padded decimal address), which
//! only exists for diagnostics and never appears on the wire.

use std::fmt;

use crate::protocol::ModbusAddress;

/// Common surface of the four register kinds
pub trait Register: Sized {
    /// Stored value type (bit or 16-bit word)
    type Value: Copy;

    /// Create a register at the given address with an initial value
    fn new(address: ModbusAddress, value: Self::Value) -> Self;

    /// The register address (0-65535)
    fn address(&self) -> ModbusAddress;

    /// Current value
    fn value(&self) -> Self::Value;

    /// Replace the value in place
    fn set(&mut self, value: Self::Value);
}

macro_rules! register_kind {
    ($(#[$doc:meta])* $name:ident, $value:ty, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            address: u16,
            value: $value,
        }

        impl Register for $name {
            type Value = $value;

            fn new(address: ModbusAddress, value: $value) -> Self {
                Self { address, value }
            }

            fn address(&self) -> ModbusAddress {
                self.address
            }

            fn value(&self) -> $value {
                self.value
            }

            fn set(&mut self, value: $value) {
                self.value = value;
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{:05}"), self.address)
            }
        }
    };
}

register_kind!(
    /// A single client-writable bit (FC01 read, FC05/FC15 write)
    Coil,
    bool,
    "0"
);

register_kind!(
    /// A single application-maintained bit (FC02 read)
    DiscreteInput,
    bool,
    "1"
);

register_kind!(
    /// A 16-bit application-maintained word (FC04 read)
    InputRegister,
    u16,
    "3"
);

register_kind!(
    /// A 16-bit client-writable word (FC03 read, FC06/FC16 write)
    HoldingRegister,
    u16,
    "4"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_accessors() {
        let mut coil = Coil::new(1, true);
        assert_eq!(coil.address(), 1);
        assert!(coil.value());
        coil.set(false);
        assert!(!coil.value());

        let mut holding = HoldingRegister::new(20, 1000);
        assert_eq!(holding.address(), 20);
        assert_eq!(holding.value(), 1000);
        holding.set(6000);
        assert_eq!(holding.value(), 6000);
    }

    #[test]
    fn test_application_side_kinds() {
        let mut input = DiscreteInput::new(100, true);
        assert!(input.value());
        input.set(false);
        assert!(!input.value());

        let mut reg = InputRegister::new(10, 2000);
        assert_eq!(reg.value(), 2000);
        reg.set(3000);
        assert_eq!(reg.value(), 3000);
    }

    #[test]
    fn test_reference_notation() {
        assert_eq!(Coil::new(1, false).to_string(), "000001");
        assert_eq!(DiscreteInput::new(100, false).to_string(), "100100");
        assert_eq!(InputRegister::new(10, 0).to_string(), "300010");
        assert_eq!(HoldingRegister::new(65535, 0).to_string(), "465535");
    }
}
