//! A GATT server with a counter service, served over an in-memory channel.
//!
//! Run with: cargo run --example gatt_server

use gattkit::gatt::{Notifier, ReadRequest, ReadResponseWriter, Request, STATUS_SUCCESS};
use gattkit::l2cap::{in_memory_channel, PduReader, PduWriter};
use gattkit::{BdAddr, Server};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new("gophergatt");

    let svc = server.add_service("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse()?)?;

    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse()?)
        .handle_read(|_req: &ReadRequest, resp: &mut ReadResponseWriter| {
            let _ = resp.write(b"count: 1");
        });

    svc.add_characteristic("16fe0d80-c111-11e3-b8c8-0002a5d5c51b".parse()?)
        .handle_write(|_req: &Request, data: &[u8]| {
            println!("wrote: {:?}", String::from_utf8_lossy(data));
            STATUS_SUCCESS
        });

    svc.add_characteristic("1c927b50-c116-11e3-8a33-0800200c9a66".parse()?)
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

    server.finalize();
    let server = Arc::new(server);

    // In a deployment the transport collaborator accepts connections and
    // hands over the stripped ATT bearer; here a local channel pair stands
    // in for one central.
    let (central_tx, server_rx) = in_memory_channel();
    let (server_tx, mut central_rx) = in_memory_channel();
    let _ = server.serve_connection(
        BdAddr::new([0x55, 0x44, 0x33, 0x22, 0x11, 0x00]),
        Box::new(server_rx),
        Arc::new(server_tx),
    );

    // Drive a few requests the way a central would.
    for req in [
        hex::decode("028700")?,             // exchange MTU
        hex::decode("10010003000028")?,     // read by group 0x2800
        hex::decode("0a0900")?,             // read the counter value
        hex::decode("120b00616263646566")?, // write "abcdef"
    ] {
        central_tx.write_pdu(&req)?;
        let resp = central_rx.read_pdu()?;
        println!("-> {}  <- {}", hex::encode(&req), hex::encode(&resp));
    }

    Ok(())
}
