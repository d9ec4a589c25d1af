use std::time::{Duration, Instant};

use super::*;
use crate::client::RequesterState;
use crate::codec::{ByteOrder, WordOrder};

const TIMEOUT: Duration = Duration::from_secs(1);

fn with_crc(data: &[u8]) -> Vec<u8> {
    let mut frame = data.to_vec();
    frame.extend_from_slice(&State::<MODBUS>::calculate(data).to_le_bytes());
    frame
}

fn requester(transport: ScriptedTransport) -> Requester<ScriptedTransport> {
    Requester::new(transport, RequesterConfig::default())
}

#[test]
fn test_read_holdings() {
    let reply = with_crc(&[1, 3, 8, 0x08, 0x98, 0x04, 0xB0, 0x01, 0xF4, 0x04, 0x7E]);
    let mut requester = requester(ScriptedTransport::new().reply(&[&reply]));
    assert_eq!(
        requester.send_read(1, 0, 4, TIMEOUT).unwrap(),
        vec![2200, 1200, 500, 1150]
    );
    assert_eq!(requester.state(), RequesterState::Idle);
    let transport = requester.into_inner();
    assert_eq!(transport.written, vec![vec![1, 3, 0, 0, 0, 4, 0x44, 0x09]]);
}

#[test]
fn test_bad_crc_is_discarded() {
    let good = with_crc(&[1, 3, 2, 0x08, 0x98]);
    let mut bad = good.clone();
    bad[3] ^= 0x01;
    let mut requester = requester(ScriptedTransport::new().reply(&[&bad, &good]));
    assert_eq!(requester.send_read(1, 0, 1, TIMEOUT).unwrap(), vec![2200]);
    assert_eq!(requester.transport_mut().reads, 2);
}

#[test]
fn test_foreign_frames_are_discarded() {
    let other_unit = with_crc(&[2, 3, 2, 0, 1]);
    let other_func = with_crc(&[1, 6, 0, 0, 0, 1]);
    let wrong_count = with_crc(&[1, 3, 4, 0, 1, 0, 2]);
    let good = with_crc(&[1, 3, 2, 0x08, 0x98]);
    let mut requester = requester(
        ScriptedTransport::new().reply(&[&other_unit, &other_func, &wrong_count, &good]),
    );
    assert_eq!(requester.send_read(1, 0, 1, TIMEOUT).unwrap(), vec![2200]);
}

#[test]
fn test_exception_response() {
    let reply = with_crc(&[1, 0x83, 2]);
    assert_eq!(reply, vec![1, 0x83, 2, 0xC0, 0xF1]);
    let mut requester = requester(ScriptedTransport::new().reply(&[&reply]));
    assert_eq!(
        requester.send_read(1, 10, 1, TIMEOUT),
        Err(ErrorKind::IllegalDataAddress)
    );
    assert_eq!(requester.state(), RequesterState::Idle);
    let reply = with_crc(&[1, 0x86, 6]);
    requester = Requester::new(
        ScriptedTransport::new().reply(&[&reply]),
        RequesterConfig::default(),
    );
    assert_eq!(
        requester.send_write_single(1, 0, 1, TIMEOUT),
        Err(ErrorKind::SlaveDeviceBusy)
    );
}

#[test]
fn test_response_timeout() {
    let mut requester = requester(ScriptedTransport::new());
    let timeout = Duration::from_millis(50);
    let started = Instant::now();
    assert_eq!(
        requester.send_read(1, 0, 1, timeout),
        Err(ErrorKind::ResponseTimeout)
    );
    assert!(started.elapsed() >= timeout);
    assert_eq!(requester.state(), RequesterState::Idle);
    assert_eq!(requester.transport_mut().written.len(), 1);
}

#[test]
fn test_local_validation_sends_nothing() {
    let mut requester = requester(ScriptedTransport::new());
    assert_eq!(
        requester.send_read(1, 0, 0, TIMEOUT),
        Err(ErrorKind::IllegalDataValue)
    );
    assert_eq!(
        requester.send_read(1, 0, 126, TIMEOUT),
        Err(ErrorKind::IllegalDataValue)
    );
    assert_eq!(
        requester.send_read(0, 0, 1, TIMEOUT),
        Err(ErrorKind::InvalidUnitId(0))
    );
    assert_eq!(
        requester.send_read(248, 0, 1, TIMEOUT),
        Err(ErrorKind::InvalidUnitId(248))
    );
    assert_eq!(
        requester.send_write_single(248, 0, 1, TIMEOUT),
        Err(ErrorKind::InvalidUnitId(248))
    );
    assert_eq!(
        requester.send_write_multiple(1, 0, &[], TIMEOUT),
        Err(ErrorKind::IllegalDataValue)
    );
    assert_eq!(
        requester.send_write_multiple(1, 0, &[0; 124], TIMEOUT),
        Err(ErrorKind::IllegalDataValue)
    );
    let transport = requester.into_inner();
    assert!(transport.written.is_empty());
    assert_eq!(transport.reads, 0);
}

#[test]
fn test_broadcast_write_awaits_nothing() {
    let mut requester = requester(ScriptedTransport::new());
    requester.send_write_single(0, 1, 3, TIMEOUT).unwrap();
    requester
        .send_write_multiple(0, 0, &[1, 2], TIMEOUT)
        .unwrap();
    let transport = requester.into_inner();
    assert_eq!(transport.written.len(), 2);
    assert_eq!(transport.written[0], with_crc(&[0, 6, 0, 1, 0, 3]));
    assert_eq!(transport.reads, 0);
}

#[test]
fn test_write_echo() {
    let echo = with_crc(&[1, 6, 0, 1, 0, 3]);
    let bulk = with_crc(&[1, 0x10, 0, 0, 0, 2]);
    let mut requester = requester(ScriptedTransport::new().reply(&[&echo]).reply(&[&bulk]));
    requester.send_write_single(1, 1, 3, TIMEOUT).unwrap();
    requester
        .send_write_multiple(1, 0, &[0x999A, 0x41BD], TIMEOUT)
        .unwrap();
    // an echo of another write is not an answer
    let wrong_echo = with_crc(&[1, 6, 0, 1, 0, 4]);
    let mut requester = Requester::new(
        ScriptedTransport::new().reply(&[&wrong_echo]),
        RequesterConfig::default(),
    );
    assert_eq!(
        requester.send_write_single(1, 1, 3, Duration::from_millis(30)),
        Err(ErrorKind::ResponseTimeout)
    );
}

#[test]
fn test_late_response_is_drained() {
    let stale = with_crc(&[1, 3, 2, 0, 1]);
    let fresh = with_crc(&[1, 3, 2, 0x08, 0x98]);
    let mut requester = requester(ScriptedTransport::new().reply(&[]).reply(&[&fresh]));
    assert_eq!(
        requester.send_read(1, 0, 1, Duration::from_millis(20)),
        Err(ErrorKind::ResponseTimeout)
    );
    // the answer to the first request shows up after the deadline
    requester.transport_mut().push_incoming(&stale);
    assert_eq!(requester.send_read(1, 0, 1, TIMEOUT).unwrap(), vec![2200]);
    assert_eq!(requester.transport_mut().written.len(), 2);
}

#[test]
fn test_measurements() {
    let mut requester = requester(
        ScriptedTransport::new()
            .reply(&[&with_crc(&[1, 3, 4, 0x99, 0x9A, 0x41, 0xBD])])
            .reply(&[&with_crc(&[1, 0x10, 0, 100, 0, 2])])
            .reply(&[&with_crc(&[1, 6, 0, 0, 0x08, 0x98])]),
    );
    let float = Encoding::float32(ByteOrder::Big, WordOrder::Little);
    assert_eq!(
        requester.read_measurement(1, 100, &float).unwrap(),
        f64::from(23.7f32)
    );
    requester.write_measurement(1, 100, 23.7, &float).unwrap();
    requester
        .write_measurement(1, 0, 220.0, &Encoding::scaled(10))
        .unwrap();
    assert_eq!(
        requester.write_measurement(1, 0, -1.0, &Encoding::scaled(10)),
        Err(ErrorKind::ValueOutOfRange)
    );
    let transport = requester.into_inner();
    assert_eq!(transport.written.len(), 3);
    assert_eq!(transport.written[0], with_crc(&[1, 3, 0, 100, 0, 2]));
    assert_eq!(
        transport.written[1],
        with_crc(&[1, 0x10, 0, 100, 0, 2, 4, 0x99, 0x9A, 0x41, 0xBD])
    );
    assert_eq!(transport.written[2], with_crc(&[1, 6, 0, 0, 0x08, 0x98]));
}

#[test]
fn test_abandon_drains_before_next_request() {
    let stale = with_crc(&[1, 3, 2, 0, 1]);
    let fresh = with_crc(&[1, 3, 2, 0x08, 0x98]);
    let mut requester = requester(ScriptedTransport::new().reply(&[&fresh]));
    requester.transport_mut().push_incoming(&stale);
    requester.transport_mut().push_incoming(&stale);
    requester.abandon();
    assert_eq!(requester.state(), RequesterState::Idle);
    assert_eq!(requester.send_read(1, 0, 1, TIMEOUT).unwrap(), vec![2200]);
    // two stale chunks, one silent read, one answer
    assert_eq!(requester.transport_mut().reads, 4);
    // without it the stale answer is taken
    requester = Requester::new(
        ScriptedTransport::new().reply(&[&fresh]),
        RequesterConfig::default(),
    );
    requester.transport_mut().push_incoming(&stale);
    assert_eq!(requester.send_read(1, 0, 1, TIMEOUT).unwrap(), vec![1]);
}
