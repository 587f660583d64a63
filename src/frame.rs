//! MBAP framing for Modbus TCP
//!
//! Modbus TCP prepends a 7-byte MBAP header to every PDU:
//!
//! | Offset | Size | Field | Semantics |
//! |--------|------|-------|-----------|
//! | 0 | 2 | transaction id | Opaque; echoed in the response |
//! | 2 | 2 | protocol id | 0x0000 for Modbus TCP |
//! | 4 | 2 | length | Bytes following this field (unit id + PDU) |
//! | 6 | 1 | unit id | Echoed in the response; ignored by the core |
//!
//! [`process_frame`] is the per-request entry point of the framer: it reads
//! one request frame off a transport, delegates the PDU to the request
//! processor, and writes back the response frame with a recomputed length
//! field. A short header or an impossible length field is a frame error,
//! which the session driver answers by closing the connection.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::data_area::DataArea;
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::ModbusPdu;
use crate::processor::process_request;
use crate::protocol::UnitId;

/// Byte-stream transport the framer consumes from and produces to
///
/// [`StreamTransport`] adapts any `AsyncRead + AsyncWrite` stream; tests
/// substitute scripted transports.
#[async_trait]
pub trait FrameTransport: Send {
    /// Read exactly `buf.len()` bytes
    async fn read_exact(&mut self, buf: &mut [u8]) -> ModbusResult<()>;

    /// Write all of `data`
    async fn write_all(&mut self, data: &[u8]) -> ModbusResult<()>;

    /// Close the transport
    async fn close(&mut self) -> ModbusResult<()>;
}

/// [`FrameTransport`] over any async byte stream
///
/// Server sessions wrap their accepted `TcpStream` in this adapter.
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> StreamTransport<S> {
    /// Wrap a stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Recover the wrapped stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> FrameTransport for StreamTransport<S> {
    async fn read_exact(&mut self, buf: &mut [u8]) -> ModbusResult<()> {
        self.stream
            .read_exact(buf)
            .await
            .map(|_| ())
            .map_err(|e| ModbusError::io(format!("read failed: {}", e)))
    }

    async fn write_all(&mut self, data: &[u8]) -> ModbusResult<()> {
        self.stream
            .write_all(data)
            .await
            .map_err(|e| ModbusError::io(format!("write failed: {}", e)))
    }

    async fn close(&mut self) -> ModbusResult<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| ModbusError::io(format!("shutdown failed: {}", e)))
    }
}

/// MBAP header of a Modbus TCP frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Request/response pairing id, echoed verbatim
    pub transaction_id: u16,
    /// Always 0x0000 for Modbus TCP
    pub protocol_id: u16,
    /// Number of bytes following this field (unit id + PDU)
    pub length: u16,
    /// Addressed unit, echoed verbatim
    pub unit_id: UnitId,
}

impl MbapHeader {
    /// Header size on the wire
    pub const SIZE: usize = MBAP_HEADER_LEN;

    /// Parse a header from exactly [`MbapHeader::SIZE`] leading bytes
    pub fn from_bytes(bytes: &[u8]) -> ModbusResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(ModbusError::frame(format!(
                "short MBAP header: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            unit_id: bytes[6],
        })
    }

    /// Encode the header back to wire bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id;
        bytes
    }

    /// Build the response header for a PDU of `pdu_len` bytes
    ///
    /// Echoes the transaction and unit ids, forces protocol id 0x0000 and
    /// recomputes the length field.
    pub fn response_to(&self, pdu_len: usize) -> Self {
        Self {
            transaction_id: self.transaction_id,
            protocol_id: 0,
            length: (pdu_len + 1) as u16,
            unit_id: self.unit_id,
        }
    }
}

/// Read one request frame: the 7-byte MBAP header, then `length - 1` PDU bytes
pub async fn read_request<T: FrameTransport + ?Sized>(
    transport: &mut T,
) -> ModbusResult<(MbapHeader, Vec<u8>)> {
    let mut header_buf = [0u8; MbapHeader::SIZE];
    transport.read_exact(&mut header_buf).await?;
    let header = MbapHeader::from_bytes(&header_buf)?;

    // length counts the unit id plus at least a function code, and the PDU
    // is bounded by the protocol frame size
    if header.length < 2 || header.length as usize > MAX_MBAP_LENGTH {
        return Err(ModbusError::frame(format!(
            "impossible MBAP length field: {}",
            header.length
        )));
    }

    let mut pdu = vec![0u8; header.length as usize - 1];
    transport.read_exact(&mut pdu).await?;

    trace!(
        "Frame in: tid={:#06X} unit={} pdu_len={}",
        header.transaction_id,
        header.unit_id,
        pdu.len()
    );

    Ok((header, pdu))
}

/// Write one response frame for `pdu`, echoing ids from `request_header`
pub async fn write_response<T: FrameTransport + ?Sized>(
    transport: &mut T,
    request_header: &MbapHeader,
    pdu: &ModbusPdu,
) -> ModbusResult<()> {
    let header = request_header.response_to(pdu.len());

    let mut frame = Vec::with_capacity(MbapHeader::SIZE + pdu.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(pdu.as_slice());

    transport.write_all(&frame).await?;

    trace!(
        "Frame out: tid={:#06X} unit={} pdu_len={}",
        header.transaction_id,
        header.unit_id,
        pdu.len()
    );

    Ok(())
}

/// Serve one request from the transport
///
/// Reads a frame, runs the PDU through the processor against `data_area`,
/// and writes the response frame. Returns the response PDU so the caller
/// can account for exceptions and sizes. Frame and transport errors bubble
/// up; the caller drops the connection on any of them.
pub async fn process_frame<T: FrameTransport + ?Sized>(
    transport: &mut T,
    data_area: &DataArea,
) -> ModbusResult<ModbusPdu> {
    let (header, request_pdu) = read_request(transport).await?;
    let response = process_request(&request_pdu, data_area)?;

    if response.is_exception() {
        debug!(
            "Request tid={:#06X} answered with exception 0x{:02X}",
            header.transaction_id,
            response.exception_code().unwrap_or(0)
        );
    }

    write_response(transport, &header, &response).await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{Coil, Register};
    use std::collections::VecDeque;

    /// Scripted transport: serves queued input bytes and records output
    struct MockTransport {
        input: VecDeque<u8>,
        output: Vec<u8>,
        closed: bool,
    }

    impl MockTransport {
        fn new(input: &[u8]) -> Self {
            Self {
                input: input.iter().copied().collect(),
                output: Vec::new(),
                closed: false,
            }
        }
    }

    #[async_trait]
    impl FrameTransport for MockTransport {
        async fn read_exact(&mut self, buf: &mut [u8]) -> ModbusResult<()> {
            if self.input.len() < buf.len() {
                return Err(ModbusError::io("unexpected end of stream"));
            }
            for byte in buf.iter_mut() {
                *byte = self.input.pop_front().unwrap();
            }
            Ok(())
        }

        async fn write_all(&mut self, data: &[u8]) -> ModbusResult<()> {
            self.output.extend_from_slice(data);
            Ok(())
        }

        async fn close(&mut self) -> ModbusResult<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn test_mbap_round_trip_identity() {
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01];
        let header = MbapHeader::from_bytes(&bytes).unwrap();

        assert_eq!(header.transaction_id, 0x0001);
        assert_eq!(header.protocol_id, 0x0000);
        assert_eq!(header.length, 0x0006);
        assert_eq!(header.unit_id, 0x01);
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn test_mbap_round_trip_arbitrary_fields() {
        let bytes = [0xAB, 0xCD, 0x12, 0x34, 0x00, 0xFE, 0xFF];
        let header = MbapHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn test_mbap_short_header_rejected() {
        assert!(MbapHeader::from_bytes(&[0x00, 0x01, 0x00]).is_err());
        assert!(MbapHeader::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_response_header_recomputes_length() {
        let request = MbapHeader {
            transaction_id: 0x0001,
            protocol_id: 0x1234,
            length: 6,
            unit_id: 0x11,
        };

        let response = request.response_to(3);
        assert_eq!(response.transaction_id, 0x0001);
        assert_eq!(response.protocol_id, 0x0000);
        assert_eq!(response.length, 4);
        assert_eq!(response.unit_id, 0x11);
    }

    #[tokio::test]
    async fn test_read_request_splits_header_and_pdu() {
        let mut transport = MockTransport::new(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, // MBAP
            0x01, 0x00, 0x01, 0x00, 0x08, // PDU
        ]);

        let (header, pdu) = read_request(&mut transport).await.unwrap();
        assert_eq!(header.transaction_id, 0x0001);
        assert_eq!(header.unit_id, 0x01);
        assert_eq!(pdu, vec![0x01, 0x00, 0x01, 0x00, 0x08]);
    }

    #[tokio::test]
    async fn test_read_request_rejects_impossible_length() {
        // length 0: no room for the unit id
        let mut transport =
            MockTransport::new(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert!(read_request(&mut transport).await.is_err());

        // length 1: empty PDU
        let mut transport =
            MockTransport::new(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01]);
        assert!(read_request(&mut transport).await.is_err());

        // length 255: beyond the maximum PDU
        let mut transport =
            MockTransport::new(&[0x00, 0x01, 0x00, 0x00, 0x00, 0xFF, 0x01]);
        assert!(read_request(&mut transport).await.is_err());
    }

    #[tokio::test]
    async fn test_read_request_short_stream_fails() {
        let mut transport = MockTransport::new(&[0x00, 0x01, 0x00]);
        assert!(read_request(&mut transport).await.is_err());

        transport.close().await.unwrap();
        assert!(transport.closed);
    }

    #[tokio::test]
    async fn test_process_frame_echoes_mbap() {
        let area = DataArea::new();
        for address in 0..10u16 {
            area.insert_coil(Coil::new(address, true)).unwrap();
        }

        let mut transport = MockTransport::new(&[
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, // MBAP
            0x01, 0x00, 0x01, 0x00, 0x08, // Read Coils PDU
        ]);

        let response = process_frame(&mut transport, &area).await.unwrap();
        assert!(!response.is_exception());

        assert_eq!(
            transport.output,
            vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x01, 0x01, 0xFF]
        );
    }

    #[tokio::test]
    async fn test_process_frame_exception_keeps_connection_usable() {
        let area = DataArea::new();

        let mut transport = MockTransport::new(&[
            0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, // MBAP
            0x01, 0x00, 0x0F, 0x00, 0x0A, // Read Coils on empty area
        ]);

        let response = process_frame(&mut transport, &area).await.unwrap();
        assert!(response.is_exception());

        assert_eq!(
            transport.output,
            vec![0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x01, 0x81, 0x02]
        );
    }

    #[tokio::test]
    async fn test_stream_transport_adapts_tokio_streams() {
        let (client, server) = tokio::io::duplex(64);
        let mut client = StreamTransport::new(client);
        let mut server = StreamTransport::new(server);

        client.write_all(&[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_process_frame_over_duplex_stream() {
        let area = DataArea::new();
        area.insert_coil(Coil::new(0, true)).unwrap();

        let (client, server) = tokio::io::duplex(512);
        let mut client = StreamTransport::new(client);
        let mut server = StreamTransport::new(server);

        client
            .write_all(&[
                0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0x02, 0x01, 0x00, 0x00, 0x00, 0x01,
            ])
            .await
            .unwrap();

        process_frame(&mut server, &area).await.unwrap();

        let mut response = [0u8; 10];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(
            response,
            [0x00, 0x09, 0x00, 0x00, 0x00, 0x04, 0x02, 0x01, 0x01, 0x01]
        );
    }
}
