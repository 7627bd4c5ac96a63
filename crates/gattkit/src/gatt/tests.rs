//! End-to-end tests: a served connection driven with raw ATT PDUs over an
//! in-memory channel, and a client/server loopback.

use crate::gap::BdAddr;
use crate::gatt::{
    GattClient, Notifier, Properties, ReadRequest, ReadResponseWriter, Request, Server,
    STATUS_SUCCESS,
};
use crate::l2cap::{in_memory_channel, InMemoryReader, PduReader, PduWriter};
use crate::uuid::Uuid;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn test_server(wrote: Arc<Mutex<Vec<u8>>>) -> Server {
    let mut server = Server::new("");
    let svc = server
        .add_service("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap())
        .unwrap();

    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse().unwrap())
        .handle_read(|_req: &ReadRequest, resp: &mut ReadResponseWriter| {
            let _ = resp.write(b"count: 1");
        });

    svc.add_characteristic("16fe0d80-c111-11e3-b8c8-0002a5d5c51b".parse().unwrap())
        .handle_write(move |_req: &Request, data: &[u8]| {
            *wrote.lock().unwrap() = data.to_vec();
            STATUS_SUCCESS
        });

    svc.add_characteristic("1c927b50-c116-11e3-8a33-0800200c9a66".parse().unwrap())
        .handle_notify(|_req: &Request, n: Notifier| {
            let mut count = 0;
            while !n.done() {
                let data = format!("Count: {}", count);
                if n.write(data.as_bytes()).is_err() {
                    break;
                }
                count += 1;
            }
        });

    server
}

struct Harness {
    to_server: Box<dyn PduWriter>,
    from_server: InMemoryReader,
}

impl Harness {
    fn start(mut server: Server) -> Self {
        server.finalize();
        let server = Arc::new(server);

        let (client_tx, server_rx) = in_memory_channel();
        let (server_tx, client_rx) = in_memory_channel();
        let _ = server.serve_connection(
            BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]),
            Box::new(server_rx),
            Arc::new(server_tx),
        );

        Harness {
            to_server: Box::new(client_tx),
            from_server: client_rx,
        }
    }

    fn send(&mut self, hex_pdu: &str) {
        self.to_server
            .write_pdu(&hex::decode(hex_pdu).unwrap())
            .unwrap();
    }

    fn recv(&mut self) -> String {
        hex::encode(self.from_server.read_pdu().unwrap())
    }

    fn round_trip(&mut self, send: &str, want: &str) {
        self.send(send);
        assert_eq!(self.recv(), want, "request {}", send);
    }
}

// Generated handles for the test database:
//   1  service 0x1800                 [1, 5]
//   2  characteristic 0x2A00 (read)
//   3  value
//   4  characteristic 0x2A01 (read)
//   5  value
//   6  service 0x1801                 [6, 6]
//   7  service 09fc95c0-...           [7, 0xFFFF]
//   8  characteristic 11fac9e0-... (read)
//   9  value
//  10  characteristic 16fe0d80-... (write)
//  11  value
//  12  characteristic 1c927b50-... (notify)
//  13  value
//  14  CCC
#[test]
fn test_request_response_vectors() {
    let wrote = Arc::new(Mutex::new(Vec::new()));
    let mut h = Harness::start(test_server(Arc::clone(&wrote)));

    // Exchange MTU: granted value echoes back.
    h.round_trip("028700", "038700");
    // Keep later responses small.
    h.round_trip("021700", "031700");

    // Unknown opcode.
    h.round_trip("ff1234567890", "01ff000006");

    // Find Information [1,10]: 0x2800, 0x2803, 0x2a00, 0x2803, 0x2a01.
    // Five pairs fill the 23-byte MTU; the sixth does not fit.
    h.round_trip("0401000a00", "050101000028020003280300002a040003280500012a");

    // Find Information [1,2].
    h.round_trip("0401000200", "05010100002802000328");

    // Find By Type Value, primary service with the user UUID: [7, 0xFFFF].
    h.round_trip(
        "0601000b0000281bc5d5a502000499e31111c1c095fc09",
        "070700ffff",
    );

    // Read By Group Type with a non-group UUID.
    h.round_trip("10010003001bc5d5a502000499e31111c1c095fc09", "0110010010");

    // Read By Group Type 0x2800 over [1,3]: GAP service at [1,5].
    h.round_trip("10010003000028", "1106010005000018");

    // Over [1,14]: GAP and GATT; the 128-bit user service ends the batch.
    h.round_trip("1001000e000028", "1106010005000018060006000118");

    // Read By Type, device name over [1,5]: handle 3, "".
    h.round_trip("0801000500002a", "09020300");

    // Device name over [4,5]: not found.
    h.round_trip("0804000500002a", "010804000a");

    // Characteristic declarations over [6,6]: none.
    h.round_trip("08060006000328", "010806000a");

    // Read the dynamic characteristic value.
    h.round_trip("0a0900", "0b636f756e743a2031");

    // Write "abcdef" through the write handler.
    h.round_trip("120b00616263646566", "13");
    assert_eq!(wrote.lock().unwrap().as_slice(), b"abcdef");
}

#[test]
fn test_notify_flow() {
    let wrote = Arc::new(Mutex::new(Vec::new()));
    let mut h = Harness::start(test_server(wrote));

    // Enable notifications on the CCC at handle 14.
    h.round_trip("120e000100", "13");

    // Notifications arrive in issue order, capped at MTU - 3.
    assert_eq!(h.recv(), "1b0d00436f756e743a2030"); // "Count: 0"
    assert_eq!(h.recv(), "1b0d00436f756e743a2031"); // "Count: 1"

    // Disable: the write response comes back and the stream stops.
    h.round_trip("120e000000", "13");

    // Re-enabling restarts the handler from scratch.
    h.round_trip("120e000100", "13");
    assert_eq!(h.recv(), "1b0d00436f756e743a2030");
    h.round_trip("120e000000", "13");
}

#[test]
fn test_notification_truncated_to_cap() {
    let mut server = Server::new("");
    let svc = server
        .add_service("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap())
        .unwrap();
    svc.add_characteristic("1c927b50-c116-11e3-8a33-0800200c9a66".parse().unwrap())
        .handle_notify(|_req: &Request, n: Notifier| {
            assert_eq!(n.cap(), 20);
            let _ = n.write(&[0x41; 64]);
        });

    let mut h = Harness::start(server);
    // CCC handle: 7 svc, 8 decl, 9 value, 10 CCC.
    h.round_trip("120a000100", "13");
    let pdu = hex::decode(h.recv()).unwrap();
    assert_eq!(pdu[0], 0x1b);
    assert_eq!(pdu.len(), 23); // capped at the default MTU
}

#[test]
fn test_disconnect_stops_notifier() {
    let (stopped_tx, stopped_rx) = channel::<()>();
    let stopped_tx = Mutex::new(stopped_tx);

    let mut server = Server::new("");
    let svc = server
        .add_service("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap())
        .unwrap();
    svc.add_characteristic("1c927b50-c116-11e3-8a33-0800200c9a66".parse().unwrap())
        .handle_notify(move |_req: &Request, n: Notifier| {
            while n.write(b"tick").is_ok() {}
            let _ = stopped_tx.lock().unwrap().send(());
        });
    server.finalize();
    let server = Arc::new(server);

    let (client_tx, server_rx) = in_memory_channel();
    let (server_tx, client_rx) = in_memory_channel();
    let handle = server.serve_connection(
        BdAddr::default(),
        Box::new(server_rx),
        Arc::new(server_tx),
    );

    // Subscribe, then drop the client side entirely.
    client_tx
        .write_pdu(&hex::decode("120a000100").unwrap())
        .unwrap();
    let mut client_rx = client_rx;
    assert_eq!(client_rx.read_pdu().unwrap(), vec![0x13]);
    drop(client_rx);
    drop(client_tx);

    // The serve loop exits and tears the notifier down; its next write
    // fails and the handler returns.
    handle.join().unwrap();
    stopped_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("notify handler should stop after disconnect");
}

#[test]
fn test_connect_disconnect_callbacks() {
    let (events_tx, events_rx) = channel::<String>();

    let mut server = Server::new("gopher");
    let tx = Arc::new(Mutex::new(events_tx));
    let tx1 = Arc::clone(&tx);
    server.on_connect(move |c| {
        let _ = tx1.lock().unwrap().send(format!("connect {}", c.remote_addr()));
    });
    let tx2 = Arc::clone(&tx);
    server.on_disconnect(move |c| {
        let _ = tx2.lock().unwrap().send(format!("disconnect {}", c.remote_addr()));
    });
    server.finalize();
    let server = Arc::new(server);

    let (client_tx, server_rx) = in_memory_channel();
    let (server_tx, _client_rx) = in_memory_channel();
    let handle = server.serve_connection(
        BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]),
        Box::new(server_rx),
        Arc::new(server_tx),
    );

    assert_eq!(events_rx.recv().unwrap(), "connect 00:11:22:33:44:55");
    drop(client_tx);
    handle.join().unwrap();
    assert_eq!(events_rx.recv().unwrap(), "disconnect 00:11:22:33:44:55");
}

#[test]
fn test_client_server_loopback() {
    let wrote = Arc::new(Mutex::new(Vec::new()));
    let mut server = test_server(Arc::clone(&wrote));
    server.finalize();
    let server = Arc::new(server);

    let (client_tx, server_rx) = in_memory_channel();
    let (server_tx, client_rx) = in_memory_channel();
    let _ = server.serve_connection(BdAddr::default(), Box::new(server_rx), Arc::new(server_tx));

    let mut client = GattClient::new(Box::new(client_rx), Arc::new(client_tx));

    assert_eq!(client.exchange_mtu(135).unwrap(), 135);

    // Service discovery finds GAP, GATT, and the user service.
    let services = client.discover_services().unwrap();
    let uuids: Vec<Uuid> = services.iter().map(|s| s.uuid).collect();
    assert_eq!(
        uuids,
        vec![
            Uuid::uuid16(0x1800),
            Uuid::uuid16(0x1801),
            "09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap(),
        ]
    );
    assert_eq!(services[2].start_handle, 7);
    assert_eq!(services[2].end_handle, 0xFFFF);

    // Find By Type Value agrees.
    let found = client.find_service(&services[2].uuid).unwrap().unwrap();
    assert_eq!(found.start_handle, 7);

    // Characteristic discovery inside the user service.
    let chars = client.discover_characteristics(&services[2]).unwrap();
    assert_eq!(chars.len(), 3);
    assert_eq!(chars[0].value_handle, 9);
    assert!(chars[0].properties.can_read());
    assert_eq!(chars[1].value_handle, 11);
    assert!(chars[1].properties.can_write());
    assert_eq!(chars[2].value_handle, 13);
    assert!(chars[2].properties.can_notify());

    // The notify characteristic carries its CCC descriptor.
    let descs = client.discover_descriptors(&chars[2]).unwrap();
    assert_eq!(descs.len(), 1);
    assert_eq!(descs[0].uuid, Uuid::uuid16(0x2902));
    assert_eq!(descs[0].handle, 14);

    // Read and write round-trip through the user handlers.
    assert_eq!(client.read(chars[0].value_handle).unwrap(), b"count: 1");
    client.write(chars[1].value_handle, b"abcdef").unwrap();
    assert_eq!(wrote.lock().unwrap().as_slice(), b"abcdef");

    // Subscribe and collect a couple of notifications.
    let (notified_tx, notified_rx) = channel::<(u16, Vec<u8>)>();
    client.on_notification(move |handle, data| {
        let _ = notified_tx.send((handle, data.to_vec()));
    });
    client.subscribe(descs[0].handle).unwrap();

    let (handle, first) = notified_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(handle, 13);
    assert_eq!(first, b"Count: 0");
    let (_, second) = notified_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(second, b"Count: 1");

    client.unsubscribe(descs[0].handle).unwrap();
}

#[test]
fn test_read_device_name_via_client() {
    let mut server = Server::new("Gopher");
    server.finalize();
    let server = Arc::new(server);

    let (client_tx, server_rx) = in_memory_channel();
    let (server_tx, client_rx) = in_memory_channel();
    let _ = server.serve_connection(BdAddr::default(), Box::new(server_rx), Arc::new(server_tx));

    let mut client = GattClient::new(Box::new(client_rx), Arc::new(client_tx));
    let services = client.discover_services().unwrap();
    let gap = &services[0];
    let chars = client.discover_characteristics(gap).unwrap();
    assert_eq!(chars[0].uuid, Uuid::uuid16(0x2A00));
    assert_eq!(client.read(chars[0].value_handle).unwrap(), b"Gopher");
}

#[test]
fn test_security_gate_over_connection() {
    let mut server = Server::new("");
    let svc = server
        .add_service("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse().unwrap())
        .unwrap();
    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse().unwrap())
        .set_value(b"secret".to_vec())
        .set_secure(Properties::READ);

    let mut h = Harness::start(server);
    // Value handle 9; link security starts Low.
    h.round_trip("0a0900", "010a090005");
}
