//! Station Modbus demo server
//!
//! Boots a Modbus TCP server with a generated register map and serves
//! until interrupted. Any conforming Modbus TCP client can read and write
//! against it.
//!
//! Usage: cargo run --bin server [listen_address]
//! Example: cargo run --bin server 0.0.0.0:1502

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use station_modbus::{DataArea, ModbusTcpServer, Register, ValuePattern};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{}", station_modbus::info());

    // Port 502 needs elevated privileges, so the demo defaults to 1502
    let listen_address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:1502".to_string());

    let area = Arc::new(DataArea::new());
    area.generate_coils(0, 100, ValuePattern::Zeros)?;
    area.generate_discrete_inputs(0, 100, ValuePattern::Random)?;
    area.generate_holding_registers(0, 100, ValuePattern::Incremental)?;
    area.generate_input_registers(0, 100, ValuePattern::Random)?;

    info!(
        "Register map ready: {} coils, {} discrete inputs, {} holding registers, {} input registers",
        area.coils().len(),
        area.discrete_inputs().len(),
        area.holding_registers().len(),
        area.input_registers().len()
    );
    if let Some(first) = area.holding_registers().first() {
        info!("First holding register: {} = {}", first, first.value());
    }

    let server = ModbusTcpServer::from_address(&listen_address, area).await?;

    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => {
            let stats = server.get_stats();
            info!(
                "Shutting down: {} connections, {} requests handled, {} exceptions returned",
                stats.connections_accepted, stats.requests_handled, stats.exceptions_returned
            );
        }
    }

    Ok(())
}
