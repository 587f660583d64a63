//! # Station Modbus - Async Modbus TCP Server
//!
//! A Modbus TCP server (slave station) in pure Rust: a listening service
//! that accepts client connections, executes framed Modbus requests
//! against an in-memory register store, and answers with bit-exact
//! responses or protocol exceptions.
//!
//! ## Features
//!
//! - **Full request pipeline**: MBAP framing, function-code dispatch,
//!   exhaustive validation with correct exception codes
//! - **Concurrent register store**: coils, discrete inputs, holding and
//!   input registers behind one mutex, shared by all sessions
//! - **Async sessions**: one Tokio task per connection, independent
//!   progress across clients
//! - **Test fixtures**: bulk register generation with fill patterns
//! - **Memory safe**: pure Rust, zero unsafe code
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Server |
//! |------|----------|--------|
//! | 0x01 | Read Coils | ✅ |
//! | 0x02 | Read Discrete Inputs | ✅ |
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x05 | Write Single Coil | ✅ |
//! | 0x06 | Write Single Register | ✅ |
//! | 0x0F | Write Multiple Coils | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//!
//! Any other function code is answered with an Illegal Function (0x01)
//! exception response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use station_modbus::{DataArea, ModbusTcpServer, ValuePattern};
//!
//! #[tokio::main]
//! async fn main() -> station_modbus::ModbusResult<()> {
//!     // Populate the register store
//!     let area = Arc::new(DataArea::new());
//!     area.generate_coils(0, 100, ValuePattern::Zeros)?;
//!     area.generate_holding_registers(0, 100, ValuePattern::Incremental)?;
//!
//!     // Serve Modbus TCP clients
//!     let server = ModbusTcpServer::from_address("0.0.0.0:1502", area).await?;
//!     server.serve().await
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants based on official specification
pub mod constants;

/// Modbus protocol definitions and message handling
pub mod protocol;

/// High-performance PDU with stack-allocated fixed array
pub mod pdu;

/// Register kinds held by a data area
pub mod register;

/// Shared register store
pub mod data_area;

/// Request PDU processor
pub mod processor;

/// MBAP framing for Modbus TCP
pub mod frame;

/// TCP server and per-connection sessions
pub mod server;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use station_modbus::tokio) ===
pub use tokio;

// === Core server API ===
pub use data_area::{DataArea, ValuePattern};
pub use processor::process_request;
pub use server::{ModbusTcpServer, ServerStats, StatsSnapshot};

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{ModbusAddress, ModbusException, ModbusFunction, UnitId};
pub use register::{Coil, DiscreteInput, HoldingRegister, InputRegister, Register};

// === Framing (advanced usage) ===
pub use frame::{FrameTransport, MbapHeader, StreamTransport};

// === PDU (advanced usage) ===
pub use pdu::ModbusPdu;

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Station Modbus v{} - async Modbus TCP server in pure Rust",
        VERSION
    )
}
