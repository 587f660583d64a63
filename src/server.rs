//! Modbus TCP server
//!
//! [`ModbusTcpServer`] binds a listener, accepts client connections and
//! spawns one session task per connection. Every session shares the same
//! [`DataArea`]; within a session, requests are handled strictly in
//! arrival order, one in flight at a time. Distinct connections progress
//! independently on the runtime.
//!
//! A session terminates on the first transport failure or malformed frame;
//! protocol faults inside a well-formed frame are answered with exception
//! responses and leave the connection open.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use station_modbus::{DataArea, ModbusTcpServer, ValuePattern};
//!
//! #[tokio::main]
//! async fn main() -> station_modbus::ModbusResult<()> {
//!     let area = Arc::new(DataArea::new());
//!     area.generate_holding_registers(0, 100, ValuePattern::Zeros)?;
//!
//!     let server = ModbusTcpServer::from_address("0.0.0.0:1502", area).await?;
//!     server.serve().await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::data_area::DataArea;
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{process_frame, FrameTransport, StreamTransport};

/// Counters shared by all sessions of one server
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    requests_handled: AtomicU64,
    exceptions_returned: AtomicU64,
}

impl ServerStats {
    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            exceptions_returned: self.exceptions_returned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`ServerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub requests_handled: u64,
    pub exceptions_returned: u64,
}

/// Modbus TCP server sharing one data area across all client sessions
pub struct ModbusTcpServer {
    listener: TcpListener,
    data_area: Arc<DataArea>,
    stats: Arc<ServerStats>,
}

impl ModbusTcpServer {
    /// Bind a listener on `addr`
    pub async fn bind(addr: SocketAddr, data_area: Arc<DataArea>) -> ModbusResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ModbusError::connection(format!("Failed to bind {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            data_area,
            stats: Arc::new(ServerStats::default()),
        })
    }

    /// Bind a listener from an address string
    pub async fn from_address(addr: &str, data_area: Arc<DataArea>) -> ModbusResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| ModbusError::configuration(format!("Invalid address: {}", e)))?;
        Self::bind(addr, data_area).await
    }

    /// The bound local address
    pub fn local_addr(&self) -> ModbusResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ModbusError::connection(format!("No local address: {}", e)))
    }

    /// Handle to the shared data area
    pub fn data_area(&self) -> Arc<DataArea> {
        Arc::clone(&self.data_area)
    }

    /// Get server statistics
    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Accept connections forever, spawning one session task each
    pub async fn serve(&self) -> ModbusResult<()> {
        info!(
            "Modbus TCP server listening on {}",
            self.local_addr()?
        );

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            self.stats
                .connections_accepted
                .fetch_add(1, Ordering::Relaxed);
            info!("Client connected from {}", peer);

            let data_area = Arc::clone(&self.data_area);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(session(stream, peer, data_area, stats));
        }
    }
}

/// Drive one client connection until it drops or misbehaves
async fn session(
    stream: TcpStream,
    peer: SocketAddr,
    data_area: Arc<DataArea>,
    stats: Arc<ServerStats>,
) {
    let mut transport = StreamTransport::new(stream);

    loop {
        match process_frame(&mut transport, &data_area).await {
            Ok(response) => {
                stats.requests_handled.fetch_add(1, Ordering::Relaxed);
                if response.is_exception() {
                    stats.exceptions_returned.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                debug!("Session with {} ended: {}", peer, e);
                break;
            }
        }
    }

    let _ = transport.close().await;
    info!("Client {} disconnected", peer);
}
