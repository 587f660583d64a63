//! Error types for the Modbus server library
//!
//! All fallible operations return [`ModbusResult<T>`], with [`ModbusError`]
//! covering transport faults, frame faults, protocol violations and data
//! area faults. Protocol violations that a conforming server must answer
//! with a Modbus exception response are mapped to exception PDUs in the
//! request processor; the variants here surface everything else to the
//! caller.

use thiserror::Error;

/// Result type used throughout the library
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Error type covering all failure modes of the server core
#[derive(Error, Debug)]
pub enum ModbusError {
    /// Connection establishment or socket-level errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// I/O errors on an established transport
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Malformed frame (short MBAP header, impossible length field)
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Protocol violations outside the exception-response mapping
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Function code outside the supported set
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Invalid request field or argument value
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// An address already present in the data area was inserted again
    #[error("Duplicate address: {address} is already present")]
    DuplicateAddress { address: u16 },

    /// A register store reached its 65536-entry capacity
    #[error("Capacity exceeded: {kind} store is full")]
    CapacityExceeded { kind: &'static str },

    /// A queried or written address range is not covered by the data area
    #[error("Out of range: {message}")]
    OutOfRange { message: String },

    /// Configuration errors (bad listen address, invalid startup values)
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        ModbusError::Connection {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        ModbusError::Io {
            message: message.into(),
        }
    }

    /// Create a frame error
    pub fn frame(message: impl Into<String>) -> Self {
        ModbusError::Frame {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        ModbusError::Protocol {
            message: message.into(),
        }
    }

    /// Create an invalid function code error
    pub fn invalid_function(code: u8) -> Self {
        ModbusError::InvalidFunction { code }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ModbusError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an out-of-range error
    pub fn out_of_range(message: impl Into<String>) -> Self {
        ModbusError::OutOfRange {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ModbusError::Configuration {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::Io {
            message: err.to_string(),
        }
    }
}
