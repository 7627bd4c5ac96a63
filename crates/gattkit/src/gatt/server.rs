//! The GATT server
//!
//! A [`Server`] collects services, freezes them into the attribute database,
//! and serves connections handed to it by the transport acceptor. Services
//! must all be added before the database is finalized; after that the
//! database is read-only and shared across every connection.

use crate::att::{generate_attributes, AttServer, AttributeDatabase};
use crate::error::Error;
use crate::gap::{
    name_scan_response_packet, service_advertising_packet, Advertiser, BdAddr,
    MAX_EIR_PACKET_LENGTH,
};
use crate::gatt::connection::Connection;
use crate::gatt::Service;
use crate::hci::{AdapterState, AdvertisingData, AdvertisingParameters, ControllerCommands, Heartbeat};
use crate::l2cap::{PduReader, PduWriter};
use crate::uuid::Uuid;
use log::info;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type ConnectionCallback = Box<dyn Fn(&Connection) + Send + Sync>;
type StateCallback = Box<dyn Fn(AdapterState) + Send + Sync>;
type RssiCallback = Box<dyn Fn(&Connection, i8) + Send + Sync>;

/// A GATT server: the service registry, the finalized attribute database,
/// and the lifecycle callbacks.
pub struct Server {
    name: String,
    local_addr: BdAddr,
    services: Vec<Service>,
    service_uuids: Vec<Uuid>,
    db: Option<Arc<AttributeDatabase>>,
    advertising_packet: Option<Vec<u8>>,
    scan_response_packet: Option<Vec<u8>>,
    connect_cb: Option<ConnectionCallback>,
    disconnect_cb: Option<ConnectionCallback>,
    state_cb: Option<StateCallback>,
    rssi_cb: Option<RssiCallback>,
}

impl Server {
    /// Creates a server. `name` is the device name exposed through the
    /// Generic Access service (0x1800).
    pub fn new(name: &str) -> Self {
        Server {
            name: name.to_string(),
            local_addr: BdAddr::default(),
            services: Vec::new(),
            service_uuids: Vec::new(),
            db: None,
            advertising_packet: None,
            scan_response_packet: None,
            connect_cb: None,
            disconnect_cb: None,
            state_cb: None,
            rssi_cb: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_local_addr(&mut self, addr: BdAddr) {
        self.local_addr = addr;
    }

    /// Registers a new service. All services must be added before the
    /// database is finalized.
    pub fn add_service(&mut self, uuid: Uuid) -> Result<&mut Service, Error> {
        if self.db.is_some() {
            return Err(Error::DatabaseFrozen);
        }
        self.service_uuids.push(uuid);
        self.services.push(Service::new(uuid));
        Ok(self.services.last_mut().expect("service just pushed"))
    }

    /// Overrides the automatically built advertising packet.
    pub fn set_advertising_packet(&mut self, b: Vec<u8>) -> Result<(), Error> {
        if b.len() > MAX_EIR_PACKET_LENGTH {
            return Err(Error::EirPacketTooLong);
        }
        self.advertising_packet = Some(b);
        Ok(())
    }

    /// Overrides the automatically built scan-response packet.
    pub fn set_scan_response_packet(&mut self, b: Vec<u8>) -> Result<(), Error> {
        if b.len() > MAX_EIR_PACKET_LENGTH {
            return Err(Error::EirPacketTooLong);
        }
        self.scan_response_packet = Some(b);
        Ok(())
    }

    /// Called when a central connects.
    pub fn on_connect<F: Fn(&Connection) + Send + Sync + 'static>(&mut self, f: F) {
        self.connect_cb = Some(Box::new(f));
    }

    /// Called when a central disconnects.
    pub fn on_disconnect<F: Fn(&Connection) + Send + Sync + 'static>(&mut self, f: F) {
        self.disconnect_cb = Some(Box::new(f));
    }

    /// Called when the adapter changes state.
    pub fn on_state_change<F: Fn(AdapterState) + Send + Sync + 'static>(&mut self, f: F) {
        self.state_cb = Some(Box::new(f));
    }

    /// Called when an RSSI measurement arrives for a connection.
    pub fn on_rssi<F: Fn(&Connection, i8) + Send + Sync + 'static>(&mut self, f: F) {
        self.rssi_cb = Some(Box::new(f));
    }

    /// Freezes the service list into the attribute database. Handles are
    /// assigned here; the database is read-only afterwards.
    pub fn finalize(&mut self) -> Arc<AttributeDatabase> {
        if self.db.is_none() {
            let services = std::mem::take(&mut self.services);
            let db = Arc::new(generate_attributes(&self.name, services, 1));
            info!("attribute database frozen: {} handles", db.len());
            self.db = Some(db);
        }
        self.db.as_ref().expect("database just built").clone()
    }

    /// The advertising and scan-response payloads to use: the custom packets
    /// if set, otherwise Flags plus as many service UUIDs as fit, with the
    /// name appended to the advertising packet when there is room for it and
    /// placed in the scan response otherwise.
    pub fn advertising_data(&self) -> (AdvertisingData, AdvertisingData) {
        let mut name_in_adv = false;
        let adv = if let Some(b) = &self.advertising_packet {
            AdvertisingData::from_bytes(b)
        } else {
            let (mut adv, _fit) = service_advertising_packet(&self.service_uuids);
            if !self.name.is_empty() && adv.len() + 2 + self.name.len() <= MAX_EIR_PACKET_LENGTH {
                adv.append_name(&self.name);
                name_in_adv = true;
            }
            adv.to_advertising_data()
        };

        let scan = if let Some(b) = &self.scan_response_packet {
            AdvertisingData::from_bytes(b)
        } else if !name_in_adv && !self.name.is_empty() {
            name_scan_response_packet(&self.name).to_advertising_data()
        } else {
            AdvertisingData::default()
        };
        (adv, scan)
    }

    /// Programs the advertiser with this server's payloads and starts it.
    pub fn advertise(&self, advertiser: &mut Advertiser) -> Result<(), Error> {
        let (adv, scan) = self.advertising_data();
        advertiser.update(&AdvertisingParameters::default(), &adv, &scan)?;
        advertiser.start()
    }

    /// Serves one accepted connection on its own thread. The reader is owned
    /// by the serve loop; the writer is shared with notifier tasks.
    ///
    /// Panics if the database has not been finalized.
    pub fn serve_connection(
        self: &Arc<Self>,
        remote: BdAddr,
        mut reader: Box<dyn PduReader>,
        writer: Arc<dyn PduWriter>,
    ) -> JoinHandle<()> {
        let db = self
            .db
            .as_ref()
            .expect("finalize() must be called before serving")
            .clone();
        let server = Arc::clone(self);

        thread::spawn(move || {
            info!("central {} connected", remote);
            let mut conn = Connection::new(server.local_addr, remote, writer);
            if let Some(cb) = &server.connect_cb {
                cb(&conn);
            }

            let mut att = AttServer::new(db);
            conn.serve(reader.as_mut(), &mut att);

            info!("central {} disconnected", remote);
            if let Some(cb) = &server.disconnect_cb {
                cb(&conn);
            }
        })
    }

    /// Reports an RSSI measurement for a connection.
    pub fn report_rssi(&self, conn: &mut Connection, rssi: i8) {
        conn.set_rssi(rssi);
        if let Some(cb) = &self.rssi_cb {
            cb(conn, rssi);
        }
    }

    /// Reports an adapter state change through the registered callback.
    pub fn report_state(&self, state: AdapterState) {
        if let Some(cb) = &self.state_cb {
            cb(state);
        }
    }

    /// Starts the controller liveness heartbeat. When the controller misses
    /// the deadline the advertiser is stopped and the state callback fires
    /// with Unknown.
    pub fn start_heartbeat(
        self: &Arc<Self>,
        cmds: Arc<dyn ControllerCommands>,
        advertiser: Arc<Mutex<Advertiser>>,
    ) -> Heartbeat {
        let server = Arc::clone(self);
        Heartbeat::spawn(cmds, move || {
            if let Ok(mut adv) = advertiser.lock() {
                let _ = adv.stop();
            }
            server.report_state(AdapterState::Unknown);
        })
    }
}
