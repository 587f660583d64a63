//! Protocol Data Unit buffer
//!
//! A [`ModbusPdu`] holds one PDU — function code plus data — in a
//! fixed-size stack buffer bounded by the 253-byte protocol limit, so
//! building a response never allocates. The [`request`] module constructs
//! request PDUs for the eight supported operations; the server only parses
//! requests, so those constructors exist for test fixtures and for callers
//! that need to speak to another station.

use crate::constants::MAX_PDU_SIZE;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::ModbusException;

/// One PDU in a fixed-size stack buffer
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Copy a byte slice into a new PDU
    ///
    /// Fails if the slice exceeds the 253-byte protocol limit.
    pub fn from_slice(bytes: &[u8]) -> ModbusResult<Self> {
        let mut pdu = Self::new();
        pdu.extend(bytes)?;
        Ok(pdu)
    }

    /// Build the exception response for the given function code
    ///
    /// Always exactly two bytes: the function code with the high bit set,
    /// then the exception code.
    pub fn exception(function_code: u8, exception: ModbusException) -> Self {
        let mut pdu = Self::new();
        pdu.data[0] = function_code | 0x80;
        pdu.data[1] = exception.to_u8();
        pdu.len = 2;
        pdu
    }

    /// Append one byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        self.extend(&[byte])
    }

    /// Append a u16 in big-endian wire order
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.extend(&value.to_be_bytes())
    }

    /// Append a byte slice
    pub fn extend(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        let Some(buffer) = self.data.get_mut(self.len..self.len + bytes.len()) else {
            return Err(ModbusError::protocol(format!(
                "PDU of {} + {} bytes exceeds the {}-byte limit",
                self.len,
                bytes.len(),
                MAX_PDU_SIZE
            )));
        };
        buffer.copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// The PDU bytes written so far
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Current length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bytes have been written
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The function code, if any bytes are present
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Whether this PDU is an exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        matches!(self.function_code(), Some(fc) if fc & 0x80 != 0)
    }

    /// The exception code of an exception response
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.as_slice().get(1).copied()
        } else {
            None
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Request PDU constructors for the supported operations
pub mod request {
    use super::ModbusPdu;
    use crate::error::{ModbusError, ModbusResult};
    use crate::protocol::{data_utils, ModbusFunction};

    /// A read request (FC01-FC04): start address and quantity
    pub fn read(
        function: ModbusFunction,
        start: u16,
        quantity: u16,
    ) -> ModbusResult<ModbusPdu> {
        if !function.is_read_function() {
            return Err(ModbusError::invalid_function(function.to_u8()));
        }
        let mut pdu = ModbusPdu::new();
        pdu.push(function.to_u8())?;
        pdu.push_u16(start)?;
        pdu.push_u16(quantity)?;
        Ok(pdu)
    }

    /// A Write Single Coil request (FC05)
    ///
    /// The wire encodes the state as 0xFF00 for on and 0x0000 for off.
    pub fn write_single_coil(address: u16, value: bool) -> ModbusResult<ModbusPdu> {
        let mut pdu = ModbusPdu::new();
        pdu.push(ModbusFunction::WriteSingleCoil.to_u8())?;
        pdu.push_u16(address)?;
        pdu.push_u16(if value { 0xFF00 } else { 0x0000 })?;
        Ok(pdu)
    }

    /// A Write Single Register request (FC06)
    pub fn write_single_register(address: u16, value: u16) -> ModbusResult<ModbusPdu> {
        let mut pdu = ModbusPdu::new();
        pdu.push(ModbusFunction::WriteSingleRegister.to_u8())?;
        pdu.push_u16(address)?;
        pdu.push_u16(value)?;
        Ok(pdu)
    }

    /// A Write Multiple Coils request (FC15)
    ///
    /// Packs `values` LSB-first and declares `ceil(len/8)` data bytes.
    pub fn write_multiple_coils(start: u16, values: &[bool]) -> ModbusResult<ModbusPdu> {
        let packed = data_utils::pack_bits(values);
        let mut pdu = ModbusPdu::new();
        pdu.push(ModbusFunction::WriteMultipleCoils.to_u8())?;
        pdu.push_u16(start)?;
        pdu.push_u16(values.len() as u16)?;
        pdu.push(packed.len() as u8)?;
        pdu.extend(&packed)?;
        Ok(pdu)
    }

    /// A Write Multiple Registers request (FC16)
    ///
    /// Declares `2 * len` data bytes followed by the big-endian values.
    pub fn write_multiple_registers(start: u16, values: &[u16]) -> ModbusResult<ModbusPdu> {
        let data = data_utils::registers_to_bytes(values);
        let mut pdu = ModbusPdu::new();
        pdu.push(ModbusFunction::WriteMultipleRegisters.to_u8())?;
        pdu.push_u16(start)?;
        pdu.push_u16(values.len() as u16)?;
        pdu.push(data.len() as u8)?;
        pdu.extend(&data)?;
        Ok(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ModbusFunction;

    #[test]
    fn test_pdu_append_and_inspect() {
        let mut pdu = ModbusPdu::new();
        assert!(pdu.is_empty());
        assert_eq!(pdu.function_code(), None);

        pdu.push(0x03).unwrap();
        pdu.push_u16(0x0100).unwrap();
        pdu.push_u16(0x000A).unwrap();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
        assert_eq!(pdu.function_code(), Some(0x03));
        assert!(!pdu.is_exception());
        assert_eq!(pdu.exception_code(), None);
    }

    #[test]
    fn test_pdu_capacity_is_enforced() {
        let mut pdu = ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE]).unwrap();
        assert_eq!(pdu.len(), MAX_PDU_SIZE);
        assert!(pdu.push(0).is_err());

        assert!(ModbusPdu::from_slice(&vec![0u8; MAX_PDU_SIZE + 1]).is_err());
    }

    #[test]
    fn test_exception_pdu() {
        let pdu = ModbusPdu::exception(0x03, ModbusException::IllegalDataAddress);

        assert_eq!(pdu.as_slice(), &[0x83, 0x02]);
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));
    }

    #[test]
    fn test_read_request() {
        let pdu = request::read(ModbusFunction::ReadHoldingRegisters, 0x006B, 3).unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x00, 0x6B, 0x00, 0x03]);

        // Write codes are rejected by the read constructor
        assert!(request::read(ModbusFunction::WriteSingleCoil, 0, 1).is_err());
    }

    #[test]
    fn test_write_single_requests() {
        let pdu = request::write_single_coil(0x00AC, true).unwrap();
        assert_eq!(pdu.as_slice(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);

        let pdu = request::write_single_coil(0x00AC, false).unwrap();
        assert_eq!(pdu.as_slice(), &[0x05, 0x00, 0xAC, 0x00, 0x00]);

        let pdu = request::write_single_register(0x0001, 0x0003).unwrap();
        assert_eq!(pdu.as_slice(), &[0x06, 0x00, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn test_write_multiple_coils_request() {
        let pdu = request::write_multiple_coils(0x0013, &[true, false, true, true]).unwrap();
        assert_eq!(pdu.as_slice(), &[0x0F, 0x00, 0x13, 0x00, 0x04, 0x01, 0x0D]);
    }

    #[test]
    fn test_write_multiple_registers_request() {
        let pdu = request::write_multiple_registers(0x0001, &[0x000A, 0x0102]).unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }
}
