//! End-to-end tests for the Modbus TCP server
//!
//! Each test boots a server on an ephemeral port and speaks raw Modbus TCP
//! frames over a plain socket, so the bytes asserted here are exactly the
//! bytes a conforming client would see on the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use station_modbus::pdu::request;
use station_modbus::{
    Coil, DataArea, HoldingRegister, MbapHeader, ModbusFunction, ModbusTcpServer, Register,
    ValuePattern,
};

/// Boot a server over `area` on an ephemeral port
async fn start_test_server(area: Arc<DataArea>) -> SocketAddr {
    let server = ModbusTcpServer::from_address("127.0.0.1:0", area)
        .await
        .expect("bind test server");
    let addr = server.local_addr().expect("local addr");

    tokio::spawn(async move { server.serve().await });

    // Give the acceptor a moment to start
    time::sleep(Duration::from_millis(20)).await;
    addr
}

/// Send one PDU wrapped in an MBAP frame and read back the response frame
async fn transact(
    stream: &mut TcpStream,
    transaction_id: u16,
    unit_id: u8,
    pdu: &[u8],
) -> (MbapHeader, Vec<u8>) {
    let mut frame = Vec::with_capacity(MbapHeader::SIZE + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    stream.write_all(&frame).await.expect("send frame");

    let mut header_buf = [0u8; MbapHeader::SIZE];
    stream.read_exact(&mut header_buf).await.expect("read header");
    let header = MbapHeader::from_bytes(&header_buf).expect("parse header");

    let mut response_pdu = vec![0u8; header.length as usize - 1];
    stream
        .read_exact(&mut response_pdu)
        .await
        .expect("read response PDU");

    (header, response_pdu)
}

#[tokio::test]
async fn test_mbap_echo() {
    let area = Arc::new(DataArea::new());
    for address in 0..10u16 {
        area.insert_coil(Coil::new(address, true)).unwrap();
    }
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (header, pdu) = transact(&mut stream, 0x0001, 0x01, &[0x01, 0x00, 0x01, 0x00, 0x08]).await;

    assert_eq!(
        header.to_bytes(),
        [0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01]
    );
    assert_eq!(pdu, vec![0x01, 0x01, 0xFF]);
}

#[tokio::test]
async fn test_read_holding_registers() {
    let area = Arc::new(DataArea::new());
    for i in 0..10u16 {
        area.insert_holding_register(HoldingRegister::new(i, i + 1))
            .unwrap();
    }
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = request::read(ModbusFunction::ReadHoldingRegisters, 0, 10).unwrap();
    let (_, pdu) = transact(&mut stream, 1, 1, request.as_slice()).await;

    assert_eq!(pdu[0], 0x03);
    assert_eq!(pdu[1], 20);
    let values: Vec<u16> = pdu[2..]
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(values, (1..=10).collect::<Vec<u16>>());
}

#[tokio::test]
async fn test_write_single_coil_round_trip() {
    let area = Arc::new(DataArea::new());
    area.insert_coil(Coil::new(1, false)).unwrap();
    let addr = start_test_server(Arc::clone(&area)).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = request::write_single_coil(1, true).unwrap();
    let (_, pdu) = transact(&mut stream, 1, 1, request.as_slice()).await;

    // Echo of the five request bytes
    assert_eq!(pdu, request.as_slice());

    // Visible on a subsequent read over the same connection
    let read = request::read(ModbusFunction::ReadCoils, 1, 1).unwrap();
    let (_, pdu) = transact(&mut stream, 2, 1, read.as_slice()).await;
    assert_eq!(pdu, vec![0x01, 0x01, 0x01]);

    // And in the data area itself
    assert!(area.get_coils(1, 1).unwrap()[0].value());
}

#[tokio::test]
async fn test_write_multiple_registers_round_trip() {
    let area = Arc::new(DataArea::new());
    area.generate_holding_registers(0, 8, ValuePattern::Zeros)
        .unwrap();
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = request::write_multiple_registers(1, &[101, 202, 303]).unwrap();
    let (_, pdu) = transact(&mut stream, 1, 1, request.as_slice()).await;
    assert_eq!(pdu, vec![0x10, 0x00, 0x01, 0x00, 0x03]);

    let read = request::read(ModbusFunction::ReadHoldingRegisters, 1, 3).unwrap();
    let (_, pdu) = transact(&mut stream, 2, 1, read.as_slice()).await;
    assert_eq!(
        pdu,
        vec![0x03, 0x06, 0x00, 0x65, 0x00, 0xCA, 0x01, 0x2F]
    );
}

#[tokio::test]
async fn test_invalid_address_exception() {
    let area = Arc::new(DataArea::new());
    area.generate_input_registers(0, 4, ValuePattern::Ones)
        .unwrap();
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = request::read(ModbusFunction::ReadInputRegisters, 100, 1).unwrap();
    let (header, pdu) = transact(&mut stream, 9, 1, request.as_slice()).await;

    assert_eq!(header.length, 3);
    assert_eq!(pdu, vec![0x84, 0x02]);
}

#[tokio::test]
async fn test_unknown_function_exception() {
    let area = Arc::new(DataArea::new());
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let (_, pdu) = transact(&mut stream, 1, 1, &[0x2C, 0x00, 0x01, 0x00, 0x0A]).await;
    assert_eq!(pdu, vec![0xAC, 0x01]);
}

#[tokio::test]
async fn test_unit_id_is_echoed_not_interpreted() {
    let area = Arc::new(DataArea::new());
    area.insert_coil(Coil::new(0, true)).unwrap();
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    for unit_id in [0x00, 0x01, 0x11, 0xFF] {
        let (header, pdu) =
            transact(&mut stream, 5, unit_id, &[0x01, 0x00, 0x00, 0x00, 0x01]).await;
        assert_eq!(header.unit_id, unit_id);
        assert_eq!(pdu, vec![0x01, 0x01, 0x01]);
    }
}

#[tokio::test]
async fn test_requests_answered_in_order() {
    let area = Arc::new(DataArea::new());
    area.generate_holding_registers(0, 4, ValuePattern::Incremental)
        .unwrap();
    let addr = start_test_server(area).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    for tid in 1..=20u16 {
        let request = request::read(ModbusFunction::ReadHoldingRegisters, 0, 1).unwrap();
        let (header, pdu) = transact(&mut stream, tid, 1, request.as_slice()).await;
        assert_eq!(header.transaction_id, tid);
        assert_eq!(pdu, vec![0x03, 0x02, 0x00, 0x00]);
    }
}

#[tokio::test]
async fn test_multiple_clients_share_the_data_area() {
    let area = Arc::new(DataArea::new());
    area.generate_holding_registers(0, 8, ValuePattern::Zeros)
        .unwrap();
    let addr = start_test_server(area).await;

    let mut writer = TcpStream::connect(addr).await.unwrap();
    let mut reader = TcpStream::connect(addr).await.unwrap();

    let request = request::write_single_register(5, 888).unwrap();
    let (_, pdu) = transact(&mut writer, 1, 1, request.as_slice()).await;
    assert_eq!(pdu, request.as_slice());

    let read = request::read(ModbusFunction::ReadHoldingRegisters, 5, 1).unwrap();
    let (_, pdu) = transact(&mut reader, 1, 1, read.as_slice()).await;
    assert_eq!(pdu, vec![0x03, 0x02, 0x03, 0x78]);
}

#[tokio::test]
async fn test_concurrent_writers_make_progress() {
    let area = Arc::new(DataArea::new());
    area.generate_holding_registers(0, 64, ValuePattern::Zeros)
        .unwrap();
    let addr = start_test_server(Arc::clone(&area)).await;

    let mut tasks = Vec::new();
    for client_index in 0..4u16 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for i in 0..16u16 {
                let address = client_index * 16 + i;
                let request =
                    request::write_single_register(address, address + 1).unwrap();
                let (_, pdu) = transact(&mut stream, i + 1, 1, request.as_slice()).await;
                assert_eq!(pdu, request.as_slice());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let registers = area.holding_registers();
    assert_eq!(registers.len(), 64);
    for register in registers {
        assert_eq!(register.value(), register.address() + 1);
    }
}

#[tokio::test]
async fn test_disconnect_does_not_disturb_other_sessions() {
    let area = Arc::new(DataArea::new());
    area.insert_coil(Coil::new(0, true)).unwrap();
    let addr = start_test_server(area).await;

    let mut surviving = TcpStream::connect(addr).await.unwrap();

    {
        let mut doomed = TcpStream::connect(addr).await.unwrap();
        // Half a header, then drop the connection
        doomed.write_all(&[0x00, 0x01, 0x00]).await.unwrap();
    }

    let (_, pdu) = transact(&mut surviving, 1, 1, &[0x01, 0x00, 0x00, 0x00, 0x01]).await;
    assert_eq!(pdu, vec![0x01, 0x01, 0x01]);
}
