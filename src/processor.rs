//! Request PDU processor
//!
//! The protocol state machine of the server: one call takes a request PDU
//! (function code plus data bytes) and a shared [`DataArea`], and produces
//! the response PDU. The processor is stateless per request and performs no
//! I/O; framing and transport live in [`crate::frame`] and
//! [`crate::server`].
//!
//! Every validation failure maps to a Modbus exception response rather
//! than an error: bad counts, byte-count mismatches, short data and the
//! illegal FC05 value yield Illegal Data Value (0x03), unpopulated
//! addresses yield Illegal Data Address (0x02), and unsupported function
//! codes yield Illegal Function (0x01). Only a request that violates the
//! input contract itself (an empty PDU) is an `Err`, which the session
//! driver answers by closing the connection.
//!
//! # Example
//!
//! ```rust
//! use station_modbus::{process_request, Coil, DataArea, Register};
//!
//! let area = DataArea::new();
//! for address in 0..10 {
//!     area.insert_coil(Coil::new(address, true))?;
//! }
//!
//! // Read Coils: 8 coils starting at address 1
//! let response = process_request(&[0x01, 0x00, 0x01, 0x00, 0x08], &area)?;
//! assert_eq!(response.as_slice(), &[0x01, 0x01, 0xFF]);
//! # Ok::<(), station_modbus::ModbusError>(())
//! ```

use tracing::debug;

use crate::constants::{MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS};
use crate::data_area::DataArea;
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;
use crate::protocol::data_utils::{pack_bits, registers_to_bytes, unpack_bits};
use crate::protocol::{ModbusException, ModbusFunction};
use crate::register::Register;

/// Process one request PDU against the data area
///
/// Returns the response PDU: either a normal response carrying the request
/// function code, or a two-byte exception response with the high bit set.
/// An empty request is outside the input contract and returns an error.
pub fn process_request(request: &[u8], data_area: &DataArea) -> ModbusResult<ModbusPdu> {
    let Some((&fc, data)) = request.split_first() else {
        return Err(ModbusError::frame("empty request PDU"));
    };

    let function = match ModbusFunction::from_u8(fc) {
        Ok(function) => function,
        Err(_) => {
            debug!("Unsupported function code 0x{:02X}", fc);
            return Ok(ModbusPdu::exception(fc, ModbusException::IllegalFunction));
        }
    };

    debug!(
        "Processing {} with {} data bytes",
        function,
        data.len()
    );

    match function {
        ModbusFunction::ReadCoils => read_bits(fc, data, |start, quantity| {
            data_area
                .get_coils(start, quantity)
                .map(|coils| coils.iter().map(|c| c.value()).collect())
        }),
        ModbusFunction::ReadDiscreteInputs => read_bits(fc, data, |start, quantity| {
            data_area
                .get_discrete_inputs(start, quantity)
                .map(|inputs| inputs.iter().map(|i| i.value()).collect())
        }),
        ModbusFunction::ReadHoldingRegisters => read_words(fc, data, |start, quantity| {
            data_area
                .get_holding_registers(start, quantity)
                .map(|regs| regs.iter().map(|r| r.value()).collect())
        }),
        ModbusFunction::ReadInputRegisters => read_words(fc, data, |start, quantity| {
            data_area
                .get_input_registers(start, quantity)
                .map(|regs| regs.iter().map(|r| r.value()).collect())
        }),
        ModbusFunction::WriteSingleCoil => write_single_coil(fc, data, data_area),
        ModbusFunction::WriteSingleRegister => write_single_register(fc, data, data_area),
        ModbusFunction::WriteMultipleCoils => write_multiple_coils(fc, data, data_area),
        ModbusFunction::WriteMultipleRegisters => write_multiple_registers(fc, data, data_area),
    }
}

/// Parse the leading start-address and quantity fields
fn parse_start_quantity(data: &[u8]) -> Option<(u16, u16)> {
    if data.len() < 4 {
        return None;
    }
    let start = u16::from_be_bytes([data[0], data[1]]);
    let quantity = u16::from_be_bytes([data[2], data[3]]);
    Some((start, quantity))
}

/// FC01 / FC02: read a run of bits and pack them LSB-first
fn read_bits(
    fc: u8,
    data: &[u8],
    fetch: impl FnOnce(u16, u16) -> ModbusResult<Vec<bool>>,
) -> ModbusResult<ModbusPdu> {
    let Some((start, quantity)) = parse_start_quantity(data) else {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    };
    if quantity == 0 || quantity > MAX_READ_COILS {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }

    let bits = match fetch(start, quantity) {
        Ok(bits) => bits,
        Err(_) => {
            return Ok(ModbusPdu::exception(
                fc,
                ModbusException::IllegalDataAddress,
            ))
        }
    };

    let packed = pack_bits(&bits);
    let mut response = ModbusPdu::new();
    response.push(fc)?;
    response.push(packed.len() as u8)?;
    response.extend(&packed)?;
    Ok(response)
}

/// FC03 / FC04: read a run of 16-bit registers
fn read_words(
    fc: u8,
    data: &[u8],
    fetch: impl FnOnce(u16, u16) -> ModbusResult<Vec<u16>>,
) -> ModbusResult<ModbusPdu> {
    let Some((start, quantity)) = parse_start_quantity(data) else {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    };
    if quantity == 0 || quantity > MAX_READ_REGISTERS {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }

    let words = match fetch(start, quantity) {
        Ok(words) => words,
        Err(_) => {
            return Ok(ModbusPdu::exception(
                fc,
                ModbusException::IllegalDataAddress,
            ))
        }
    };

    let bytes = registers_to_bytes(&words);
    let mut response = ModbusPdu::new();
    response.push(fc)?;
    response.push(bytes.len() as u8)?;
    response.extend(&bytes)?;
    Ok(response)
}

/// FC05: write one coil; the value field must be 0xFF00 or 0x0000
fn write_single_coil(fc: u8, data: &[u8], data_area: &DataArea) -> ModbusResult<ModbusPdu> {
    let Some((address, value)) = parse_start_quantity(data) else {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    };
    let state = match value {
        0xFF00 => true,
        0x0000 => false,
        _ => return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue)),
    };

    if data_area.write_coil(address, state).is_err() {
        return Ok(ModbusPdu::exception(
            fc,
            ModbusException::IllegalDataAddress,
        ));
    }

    echo_response(fc, &data[..4])
}

/// FC06: write one holding register; any 16-bit value is legal
fn write_single_register(fc: u8, data: &[u8], data_area: &DataArea) -> ModbusResult<ModbusPdu> {
    let Some((address, value)) = parse_start_quantity(data) else {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    };

    if data_area.write_holding_register(address, value).is_err() {
        return Ok(ModbusPdu::exception(
            fc,
            ModbusException::IllegalDataAddress,
        ));
    }

    echo_response(fc, &data[..4])
}

/// FC15: write a run of coils
///
/// Validation order: quantity bounds, declared byte count, supplied data,
/// then address range. The range is proven valid before the first coil is
/// written, so a partial write is unreachable within one request.
fn write_multiple_coils(fc: u8, data: &[u8], data_area: &DataArea) -> ModbusResult<ModbusPdu> {
    let Some((start, quantity)) = parse_start_quantity(data) else {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    };
    if data.len() < 5 {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    let byte_count = data[4] as usize;

    if quantity == 0 || quantity > MAX_WRITE_COILS {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    if byte_count != (quantity as usize).div_ceil(8) {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    if data.len() - 5 < byte_count {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    if data_area.get_coils(start, quantity).is_err() {
        return Ok(ModbusPdu::exception(
            fc,
            ModbusException::IllegalDataAddress,
        ));
    }

    let bits = unpack_bits(&data[5..5 + byte_count], quantity as usize);
    for (offset, &bit) in bits.iter().enumerate() {
        if data_area.write_coil(start + offset as u16, bit).is_err() {
            return Ok(ModbusPdu::exception(
                fc,
                ModbusException::IllegalDataAddress,
            ));
        }
    }

    write_multiple_response(fc, start, quantity)
}

/// FC16: write a run of holding registers
///
/// Same validation order as FC15 with the word-kind bounds.
fn write_multiple_registers(fc: u8, data: &[u8], data_area: &DataArea) -> ModbusResult<ModbusPdu> {
    let Some((start, quantity)) = parse_start_quantity(data) else {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    };
    if data.len() < 5 {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    let byte_count = data[4] as usize;

    if quantity == 0 || quantity > MAX_WRITE_REGISTERS {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    if byte_count != quantity as usize * 2 {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    if data.len() - 5 < byte_count {
        return Ok(ModbusPdu::exception(fc, ModbusException::IllegalDataValue));
    }
    if data_area.get_holding_registers(start, quantity).is_err() {
        return Ok(ModbusPdu::exception(
            fc,
            ModbusException::IllegalDataAddress,
        ));
    }

    let values: Vec<u16> = data[5..5 + byte_count]
        .chunks(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect();
    for (offset, &value) in values.iter().enumerate() {
        if data_area
            .write_holding_register(start + offset as u16, value)
            .is_err()
        {
            return Ok(ModbusPdu::exception(
                fc,
                ModbusException::IllegalDataAddress,
            ));
        }
    }

    write_multiple_response(fc, start, quantity)
}

/// FC05 / FC06 success response: the five request bytes verbatim
fn echo_response(fc: u8, request_data: &[u8]) -> ModbusResult<ModbusPdu> {
    let mut response = ModbusPdu::new();
    response.push(fc)?;
    response.extend(request_data)?;
    Ok(response)
}

/// FC15 / FC16 success response: function code, start, quantity
fn write_multiple_response(fc: u8, start: u16, quantity: u16) -> ModbusResult<ModbusPdu> {
    let mut response = ModbusPdu::new();
    response.push(fc)?;
    response.push_u16(start)?;
    response.push_u16(quantity)?;
    Ok(response)
}
