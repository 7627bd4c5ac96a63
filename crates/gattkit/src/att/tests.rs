//! Unit tests for the ATT layer: the PDU writer contract and per-opcode
//! server behavior. Full request/response vectors over a live connection
//! live in the gatt module tests.

use super::database::generate_attributes;
use super::pdu::PduWriter;
use super::server::{AttHandler, AttServer};
use super::*;
use crate::gatt::{Characteristic, Notifier, ReadRequest, ReadResponseWriter, Request, Service};
use std::sync::Arc;

#[test]
fn test_writer_chunk_commit() {
    // (mtu, head bytes, chunk bytes, commit fits)
    let cases = [
        (5u16, 0usize, 4usize, true),
        (5, 0, 5, true),
        (5, 0, 6, false),
        (5, 1, 3, true),
        (5, 1, 4, true),
        (5, 1, 5, false),
    ];

    for (mtu, head, chunk, ok) in cases {
        let mut w = PduWriter::new(mtu);
        let mut want = Vec::new();
        for i in 0..head {
            w.write_byte_fit(i as u8);
            want.push(i as u8);
        }
        w.chunk();
        for i in 0..chunk {
            w.write_byte_fit(i as u8);
            if ok {
                want.push(i as u8);
            }
        }
        assert_eq!(w.commit(), ok, "commit({} {} {})", mtu, head, chunk);
        assert_eq!(w.bytes(), want, "bytes({} {} {})", mtu, head, chunk);
    }
}

#[test]
#[should_panic(expected = "chunk() while a chunk is pending")]
fn test_writer_panics_on_double_chunk() {
    let mut w = PduWriter::new(5);
    w.chunk();
    w.chunk();
}

#[test]
#[should_panic(expected = "commit() without chunk()")]
fn test_writer_panics_on_commit_before_chunk() {
    let mut w = PduWriter::new(5);
    w.commit();
}

#[test]
#[should_panic(expected = "commit() without chunk()")]
fn test_writer_panics_on_double_commit() {
    let mut w = PduWriter::new(5);
    w.chunk();
    w.commit();
    w.commit();
}

#[test]
fn test_writer_chunk_seek() {
    let mut w = PduWriter::new(23);
    w.write_byte_fit(0x0B);
    w.chunk();
    w.write_fit(b"abcdef");
    assert!(w.chunk_seek(2));
    w.commit_fit();
    assert_eq!(w.bytes(), b"\x0bcdef");

    let mut w = PduWriter::new(23);
    w.chunk();
    w.write_fit(b"ab");
    assert!(w.chunk_seek(2), "seek to exactly the end is allowed");
    assert!(!w.chunk_seek(1), "seek past the end is not");
}

#[test]
fn test_writer_unchunked_writes_are_bounded() {
    let mut w = PduWriter::new(4);
    assert_eq!(w.write_fit(b"abcdef"), 4);
    assert!(!w.write_byte_fit(0xFF));
    assert_eq!(w.bytes(), b"abcd");
}

#[test]
fn test_writer_writeable_accounts_for_pad() {
    let w = PduWriter::new(23);
    let value = [0u8; 64];
    // opcode + length byte + handle leave 19 value bytes at the default MTU.
    assert_eq!(w.writeable(4, &value), 19);
    assert_eq!(w.writeable(4, &value[..10]), 10);
}

struct TestHandler {
    wrote: Vec<u8>,
    started: Vec<u16>,
    stopped: Vec<u16>,
}

impl TestHandler {
    fn new() -> Self {
        TestHandler {
            wrote: Vec::new(),
            started: Vec::new(),
            stopped: Vec::new(),
        }
    }
}

impl AttHandler for TestHandler {
    fn read_char(&mut self, ch: &Arc<Characteristic>, maxlen: usize, offset: usize) -> (Vec<u8>, u8) {
        let mut resp = ReadResponseWriter::new(maxlen);
        if let Some(h) = &ch.rhandler {
            let req = ReadRequest {
                request: Request {
                    central: crate::gap::BdAddr::new([0; 6]),
                    service: ch.service_uuid,
                    characteristic: ch.uuid,
                },
                cap: maxlen,
                offset,
            };
            h.serve_read(&req, &mut resp);
        }
        resp.into_parts()
    }

    fn write_char(&mut self, _ch: &Arc<Characteristic>, data: &[u8], _no_response: bool) -> u8 {
        self.wrote = data.to_vec();
        0
    }

    fn start_notify(&mut self, ch: &Arc<Characteristic>, _maxlen: usize) {
        self.started.push(ch.value_handle());
    }

    fn stop_notify(&mut self, ch: &Arc<Characteristic>) {
        self.stopped.push(ch.value_handle());
    }
}

fn test_server() -> AttServer {
    let mut svc = Service::new("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap());
    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse().unwrap())
        .handle_read(|_req: &ReadRequest, resp: &mut ReadResponseWriter| {
            let _ = resp.write(b"count: 1");
        });
    svc.add_characteristic("16fe0d80-c111-11e3-b8c8-0002a5d5c51b".parse().unwrap())
        .handle_write(|_req: &Request, _data: &[u8]| 0u8);
    svc.add_characteristic("1c927b50-c116-11e3-8a33-0800200c9a66".parse().unwrap())
        .handle_notify(|_req: &Request, _n: Notifier| {});
    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51d".parse().unwrap())
        .set_value(b"A really long characteristic".to_vec());

    let db = Arc::new(generate_attributes("", vec![svc], 1));
    AttServer::new(db)
}

fn exchange(server: &mut AttServer, handler: &mut TestHandler, req: &[u8]) -> Option<Vec<u8>> {
    server.handle_request(req, handler)
}

#[test]
fn test_exchange_mtu_clamp() {
    // (requested, granted): floor 23, cap 256.
    for (m, want) in [(5u16, 23u16), (23, 23), (135, 135), (256, 256), (1000, 256)] {
        let mut server = test_server();
        let mut h = TestHandler::new();
        let mut req = vec![ATT_EXCHANGE_MTU_REQ];
        req.extend_from_slice(&m.to_le_bytes());
        let resp = exchange(&mut server, &mut h, &req).unwrap();
        assert_eq!(resp[0], ATT_EXCHANGE_MTU_RSP);
        assert_eq!(u16::from_le_bytes([resp[1], resp[2]]), want, "mtu {}", m);
        assert_eq!(server.mtu(), want);
    }
}

#[test]
fn test_unknown_opcode_not_supported() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    let resp = exchange(&mut server, &mut h, &[0xFF, 0x12, 0x34]).unwrap();
    assert_eq!(resp, vec![0x01, 0xFF, 0x00, 0x00, 0x06]);

    // Read Multiple, Prepare Write, Execute Write, Signed Write, and the
    // indication opcodes are deliberately unsupported.
    for op in [0x0E, 0x16, 0x18, 0xD2, 0x1D, 0x1E] {
        let resp = exchange(&mut server, &mut h, &[op, 0x00]).unwrap();
        assert_eq!(resp, vec![0x01, op, 0x00, 0x00, 0x06], "opcode {:#04x}", op);
    }
}

#[test]
fn test_read_invalid_handle() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x63, 0x00]).unwrap();
    assert_eq!(resp, vec![0x01, 0x0A, 0x63, 0x00, 0x01]);
}

#[test]
fn test_read_dynamic_value() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    // Handle 9 is the read characteristic's value attribute.
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x09, 0x00]).unwrap();
    assert_eq!(resp[0], 0x0B);
    assert_eq!(&resp[1..], b"count: 1");
}

#[test]
fn test_read_not_permitted() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    // The write-only characteristic's value handle.
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x0B, 0x00]).unwrap();
    assert_eq!(resp, vec![0x01, 0x0A, 0x0B, 0x00, 0x02]);
}

#[test]
fn test_read_blob_static_value() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    // Handle 16 holds "A really long characteristic" (28 bytes).
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x10, 0x00]).unwrap();
    assert_eq!(resp[0], 0x0B);
    // Truncated to MTU - 1 = 22 bytes.
    assert_eq!(&resp[1..], b"A really long characte");

    let resp = exchange(&mut server, &mut h, &[0x0C, 0x10, 0x00, 0x16, 0x00]).unwrap();
    assert_eq!(resp[0], 0x0D);
    assert_eq!(&resp[1..], b"ristic");

    // Offset past the value length.
    let resp = exchange(&mut server, &mut h, &[0x0C, 0x10, 0x00, 0x40, 0x00]).unwrap();
    assert_eq!(resp, vec![0x01, 0x0C, 0x10, 0x00, 0x07]);
}

#[test]
fn test_write_routes_to_handler() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    let mut req = vec![0x12, 0x0B, 0x00];
    req.extend_from_slice(b"abcdef");
    let resp = exchange(&mut server, &mut h, &req).unwrap();
    assert_eq!(resp, vec![0x13]);
    assert_eq!(h.wrote, b"abcdef");
}

#[test]
fn test_write_command_is_silent() {
    let mut server = test_server();
    let mut h = TestHandler::new();

    // Valid command: handler runs, no response.
    let mut req = vec![0x52, 0x0B, 0x00];
    req.extend_from_slice(b"xyz");
    assert!(exchange(&mut server, &mut h, &req).is_none());
    assert_eq!(h.wrote, b"xyz");

    // Invalid handle: still no response.
    assert!(exchange(&mut server, &mut h, &[0x52, 0x63, 0x00, 0x01]).is_none());
}

#[test]
fn test_write_not_permitted_on_read_only() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    // The static-value characteristic is read-only.
    let resp = exchange(&mut server, &mut h, &[0x12, 0x10, 0x00, 0x00]).unwrap();
    assert_eq!(resp, vec![0x01, 0x12, 0x10, 0x00, 0x03]);
}

#[test]
fn test_ccc_write_flips_notifier() {
    let mut server = test_server();
    let mut h = TestHandler::new();

    // Enable: start_notify with cap MTU - 3, response 0x13.
    let resp = exchange(&mut server, &mut h, &[0x12, 0x0E, 0x00, 0x01, 0x00]).unwrap();
    assert_eq!(resp, vec![0x13]);
    assert_eq!(h.started, vec![13]);

    // Reading the CCC back reflects the per-connection value.
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x0E, 0x00]).unwrap();
    assert_eq!(resp, vec![0x0B, 0x01, 0x00]);

    // Disable: stop_notify, value reverts.
    let resp = exchange(&mut server, &mut h, &[0x12, 0x0E, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(resp, vec![0x13]);
    assert_eq!(h.stopped, vec![13]);
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x0E, 0x00]).unwrap();
    assert_eq!(resp, vec![0x0B, 0x00, 0x00]);
}

#[test]
fn test_ccc_write_requires_two_bytes() {
    let mut server = test_server();
    let mut h = TestHandler::new();
    let resp = exchange(&mut server, &mut h, &[0x12, 0x0E, 0x00, 0x01]).unwrap();
    assert_eq!(resp, vec![0x01, 0x12, 0x0E, 0x00, 0x0D]);
    assert!(h.started.is_empty());
}

#[test]
fn test_secure_read_requires_security() {
    let mut svc = Service::new("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap());
    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse().unwrap())
        .set_value(b"secret".to_vec())
        .set_secure(crate::gatt::Properties::READ);
    let db = Arc::new(generate_attributes("", vec![svc], 1));

    let mut server = AttServer::new(db);
    let mut h = TestHandler::new();

    // Value handle is 9 (after the GAP and GATT services).
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x09, 0x00]).unwrap();
    assert_eq!(resp, vec![0x01, 0x0A, 0x09, 0x00, 0x05]);

    server.set_security(SecurityLevel::Medium);
    let resp = exchange(&mut server, &mut h, &[0x0A, 0x09, 0x00]).unwrap();
    assert_eq!(&resp[1..], b"secret");
}
