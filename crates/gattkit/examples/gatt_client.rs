//! A GATT client exploring a peripheral over a loopback connection:
//! discovery, reads, writes, and a notification subscription.
//!
//! Run with: cargo run --example gatt_client

use gattkit::gatt::{Notifier, ReadRequest, ReadResponseWriter, Request};
use gattkit::l2cap::in_memory_channel;
use gattkit::{BdAddr, GattClient, Server};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The peripheral side.
    let mut server = Server::new("explorer-target");
    let svc = server.add_service("09fc95c0-c111-11e3-9904-0002a5d5c51b".parse()?)?;
    svc.add_characteristic("11fac9e0-c111-11e3-9246-0002a5d5c51b".parse()?)
        .handle_read(|_req: &ReadRequest, resp: &mut ReadResponseWriter| {
            let _ = resp.write(b"count: 1");
        });
    svc.add_characteristic("1c927b50-c116-11e3-8a33-0800200c9a66".parse()?)
        .handle_notify(|_req: &Request, n: Notifier| {
            let mut count = 0;
            while !n.done() && count < 5 {
                let _ = n.write(format!("Count: {}", count).as_bytes());
                count += 1;
            }
        });
    server.finalize();
    let server = Arc::new(server);

    let (client_tx, server_rx) = in_memory_channel();
    let (server_tx, client_rx) = in_memory_channel();
    let _ = server.serve_connection(BdAddr::default(), Box::new(server_rx), Arc::new(server_tx));

    // The central side.
    let mut client = GattClient::new(Box::new(client_rx), Arc::new(client_tx));
    let mtu = client.exchange_mtu(135)?;
    println!("mtu: {}", mtu);

    for service in client.discover_services()? {
        println!(
            "service {} [{:#06x}, {:#06x}]",
            service.uuid, service.start_handle, service.end_handle
        );

        for ch in client.discover_characteristics(&service)? {
            println!("  characteristic {} props {:#04x}", ch.uuid, ch.properties.0);

            if ch.properties.can_read() {
                let value = client.read(ch.value_handle)?;
                println!("    value: {:?}", String::from_utf8_lossy(&value));
            }

            for desc in client.discover_descriptors(&ch)? {
                println!("    descriptor {} at {:#06x}", desc.uuid, desc.handle);

                if ch.properties.can_notify() {
                    let (tx, rx) = channel();
                    client.on_notification(move |_handle, data| {
                        let _ = tx.send(data.to_vec());
                    });
                    client.subscribe(desc.handle)?;
                    for _ in 0..3 {
                        if let Ok(data) = rx.recv_timeout(Duration::from_secs(2)) {
                            println!("    notified: {:?}", String::from_utf8_lossy(&data));
                        }
                    }
                    client.unsubscribe(desc.handle)?;
                }
            }
        }
    }

    Ok(())
}
