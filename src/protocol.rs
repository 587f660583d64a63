//! Modbus protocol definitions and data structures
//!
//! This module contains the core Modbus protocol definitions: the supported
//! function codes, the exception codes a server may answer with, and the
//! packing helpers shared by the request processor and the tests.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModbusError, ModbusResult};

/// Modbus address type (0-65535)
pub type ModbusAddress = u16;

/// Modbus unit identifier carried in the MBAP header
pub type UnitId = u8;

/// Modbus function codes served by this implementation
///
/// This is the positive allow-list of operations the server answers; any
/// other code on the wire yields an Illegal Function exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModbusFunction {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Discrete Inputs (0x02)
    ReadDiscreteInputs = 0x02,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Read Input Registers (0x04)
    ReadInputRegisters = 0x04,
    /// Write Single Coil (0x05)
    WriteSingleCoil = 0x05,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
    /// Write Multiple Coils (0x0F)
    WriteMultipleCoils = 0x0F,
    /// Write Multiple Registers (0x10)
    WriteMultipleRegisters = 0x10,
}

impl ModbusFunction {
    /// Convert from u8 to ModbusFunction
    pub fn from_u8(value: u8) -> ModbusResult<Self> {
        match value {
            crate::constants::FC_READ_COILS => Ok(ModbusFunction::ReadCoils),
            crate::constants::FC_READ_DISCRETE_INPUTS => Ok(ModbusFunction::ReadDiscreteInputs),
            crate::constants::FC_READ_HOLDING_REGISTERS => Ok(ModbusFunction::ReadHoldingRegisters),
            crate::constants::FC_READ_INPUT_REGISTERS => Ok(ModbusFunction::ReadInputRegisters),
            crate::constants::FC_WRITE_SINGLE_COIL => Ok(ModbusFunction::WriteSingleCoil),
            crate::constants::FC_WRITE_SINGLE_REGISTER => Ok(ModbusFunction::WriteSingleRegister),
            crate::constants::FC_WRITE_MULTIPLE_COILS => Ok(ModbusFunction::WriteMultipleCoils),
            crate::constants::FC_WRITE_MULTIPLE_REGISTERS => {
                Ok(ModbusFunction::WriteMultipleRegisters)
            }
            _ => Err(ModbusError::invalid_function(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a read function
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            ModbusFunction::ReadCoils
                | ModbusFunction::ReadDiscreteInputs
                | ModbusFunction::ReadHoldingRegisters
                | ModbusFunction::ReadInputRegisters
        )
    }

    /// Check if this is a write function
    pub fn is_write_function(self) -> bool {
        matches!(
            self,
            ModbusFunction::WriteSingleCoil
                | ModbusFunction::WriteSingleRegister
                | ModbusFunction::WriteMultipleCoils
                | ModbusFunction::WriteMultipleRegisters
        )
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModbusFunction::ReadCoils => "Read Coils",
            ModbusFunction::ReadDiscreteInputs => "Read Discrete Inputs",
            ModbusFunction::ReadHoldingRegisters => "Read Holding Registers",
            ModbusFunction::ReadInputRegisters => "Read Input Registers",
            ModbusFunction::WriteSingleCoil => "Write Single Coil",
            ModbusFunction::WriteSingleRegister => "Write Single Register",
            ModbusFunction::WriteMultipleCoils => "Write Multiple Coils",
            ModbusFunction::WriteMultipleRegisters => "Write Multiple Registers",
        };
        write!(f, "{} (0x{:02X})", name, *self as u8)
    }
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModbusException {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ModbusException {
    /// Convert from u8 to ModbusException
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ModbusException::IllegalFunction),
            0x02 => Some(ModbusException::IllegalDataAddress),
            0x03 => Some(ModbusException::IllegalDataValue),
            0x04 => Some(ModbusException::ServerDeviceFailure),
            0x05 => Some(ModbusException::Acknowledge),
            0x06 => Some(ModbusException::ServerDeviceBusy),
            0x08 => Some(ModbusException::MemoryParityError),
            0x0A => Some(ModbusException::GatewayPathUnavailable),
            0x0B => Some(ModbusException::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ModbusException::IllegalFunction => {
                "The function code received in the query is not an allowable action for the server"
            }
            ModbusException::IllegalDataAddress => {
                "The data address received in the query is not an allowable address for the server"
            }
            ModbusException::IllegalDataValue => {
                "A value contained in the query data field is not an allowable value for server"
            }
            ModbusException::ServerDeviceFailure => {
                "An unrecoverable error occurred while the server was attempting to perform the requested action"
            }
            ModbusException::Acknowledge => {
                "The server has accepted the request and is processing it, but a long duration of time will be required to do so"
            }
            ModbusException::ServerDeviceBusy => {
                "The server is engaged in processing a long-duration program command"
            }
            ModbusException::MemoryParityError => {
                "The server attempted to read record file, but detected a parity error in the memory"
            }
            ModbusException::GatewayPathUnavailable => {
                "Gateway was unable to allocate an internal communication path"
            }
            ModbusException::GatewayTargetDeviceFailedToRespond => {
                "No response was obtained from the target device"
            }
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Modbus Exception 0x{:02X}: {}",
            self.to_u8(),
            self.description()
        )
    }
}

/// Data conversion utilities shared by the processor and tests
pub mod data_utils {
    use super::*;

    /// Convert register values to bytes (big-endian)
    pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(registers.len() * 2);
        for &register in registers {
            bytes.extend_from_slice(&register.to_be_bytes());
        }
        bytes
    }

    /// Convert bytes to register values (big-endian)
    pub fn bytes_to_registers(bytes: &[u8]) -> ModbusResult<Vec<u16>> {
        if bytes.len() % 2 != 0 {
            return Err(ModbusError::invalid_data("Byte array length must be even"));
        }

        let mut registers = Vec::with_capacity(bytes.len() / 2);
        for chunk in bytes.chunks(2) {
            registers.push(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        Ok(registers)
    }

    /// Pack boolean values into bytes
    ///
    /// The first bit lands in bit 0 (least significant) of the first byte,
    /// the eighth in bit 7. Trailing bits of the last byte stay zero.
    pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
        let byte_count = bits.len().div_ceil(8);
        let mut bytes = vec![0u8; byte_count];

        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }

        bytes
    }

    /// Unpack bytes into boolean values
    ///
    /// Reads `bit_count` bits with the same layout `pack_bits` produces;
    /// bits beyond the supplied bytes read as false.
    pub fn unpack_bits(bytes: &[u8], bit_count: usize) -> Vec<bool> {
        let mut bits = Vec::with_capacity(bit_count);

        for i in 0..bit_count {
            let byte_index = i / 8;
            let bit_index = i % 8;

            if byte_index < bytes.len() {
                bits.push((bytes[byte_index] & (1 << bit_index)) != 0);
            } else {
                bits.push(false);
            }
        }

        bits
    }
}
