//! Advertising payload construction and the advertising state machine
//!
//! Payloads are EIR fields packed into at most 31 bytes. The builder packs
//! Flags first, then as many service UUIDs as fit; the device name goes into
//! the advertising packet when there is room for it and into the scan
//! response otherwise.

use super::constants::*;
use crate::att::constants::{GAP_SERVICE_UUID, GATT_SERVICE_UUID};
use crate::error::{Error, HciError};
use crate::hci::{AdvertisingData, AdvertisingParameters, ControllerCommands};
use crate::uuid::Uuid;
use log::debug;
use std::sync::Arc;

/// The maximum allowed advertising and scan-response payload length.
pub const MAX_EIR_PACKET_LENGTH: usize = 31;

/// An EIR payload under construction.
#[derive(Debug, Default, Clone)]
pub struct AdvPacket {
    data: Vec<u8>,
}

impl AdvPacket {
    pub fn new() -> Self {
        AdvPacket::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a raw field: `{len, type, data}` where len covers the type
    /// byte and the data.
    pub fn append_field(&mut self, typ: u8, data: &[u8]) -> &mut Self {
        self.data.push(data.len() as u8 + 1);
        self.data.push(typ);
        self.data.extend_from_slice(data);
        self
    }

    /// Appends the Flags field.
    pub fn append_flags(&mut self, flags: u8) -> &mut Self {
        self.append_field(ADV_TYPE_FLAGS, &[flags])
    }

    /// Appends the local name, truncated to the remaining space. The
    /// Complete name type is used unless truncation was necessary, in which
    /// case the name is marked Shortened.
    pub fn append_name(&mut self, name: &str) -> &mut Self {
        let avail = MAX_EIR_PACKET_LENGTH.saturating_sub(self.data.len() + 2);
        if name.len() <= avail {
            self.append_field(ADV_TYPE_COMPLETE_NAME, name.as_bytes())
        } else {
            self.append_field(ADV_TYPE_SHORT_NAME, &name.as_bytes()[..avail])
        }
    }

    /// Appends manufacturer-specific data (the first two bytes are the
    /// little-endian company identifier) if it fits, and reports whether it
    /// did.
    pub fn append_manufacturer_data_fit(&mut self, company_id: u16, data: &[u8]) -> bool {
        if self.data.len() + 1 + 2 + 2 + data.len() > MAX_EIR_PACKET_LENGTH {
            return false;
        }
        let mut d = company_id.to_le_bytes().to_vec();
        d.extend_from_slice(data);
        self.append_field(ADV_TYPE_MANUFACTURER_DATA, &d);
        true
    }

    /// Appends a service UUID field if it fits, and reports whether it did.
    /// The Incomplete list types are used, since nothing guarantees that
    /// every service made it into the packet.
    pub fn append_uuid_fit(&mut self, uuid: &Uuid) -> bool {
        if self.data.len() + uuid.len() + 2 > MAX_EIR_PACKET_LENGTH {
            return false;
        }
        let typ = match uuid.len() {
            2 => ADV_TYPE_SOME_UUID16,
            _ => ADV_TYPE_SOME_UUID128,
        };
        self.append_field(typ, &uuid.to_le_bytes());
        true
    }

    /// The 31-byte zero-padded buffer with its significant length, as the
    /// controller command expects.
    pub fn to_advertising_data(&self) -> AdvertisingData {
        AdvertisingData::from_bytes(&self.data)
    }
}

/// Constructs an advertising packet that advertises as many of the provided
/// service UUIDs as possible, and returns it along with the UUIDs that fit.
/// The mandatory GAP and GATT services are skipped.
pub fn service_advertising_packet(uuids: &[Uuid]) -> (AdvPacket, Vec<Uuid>) {
    let mut adv = AdvPacket::new();
    adv.append_flags(FLAG_GENERAL_DISCOVERABLE | FLAG_LE_ONLY);

    let mut fit = Vec::new();
    for u in uuids {
        if *u == Uuid::uuid16(GAP_SERVICE_UUID) || *u == Uuid::uuid16(GATT_SERVICE_UUID) {
            continue;
        }
        if adv.append_uuid_fit(u) {
            fit.push(*u);
        }
    }
    (adv, fit)
}

/// Constructs a scan-response packet carrying the device name, truncated as
/// necessary.
pub fn name_scan_response_packet(name: &str) -> AdvPacket {
    let mut scan = AdvPacket::new();
    scan.append_name(name);
    scan
}

/// Advertising subsystem states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    Stopped,
    Advertising,
}

/// Drives the controller's advertising commands. Parameter and payload
/// updates are only issued while stopped; updating while advertising stops
/// and resumes around the change.
pub struct Advertiser {
    cmds: Arc<dyn ControllerCommands>,
    state: AdvertiserState,
}

impl Advertiser {
    pub fn new(cmds: Arc<dyn ControllerCommands>) -> Self {
        Advertiser {
            cmds,
            state: AdvertiserState::Stopped,
        }
    }

    pub fn state(&self) -> AdvertiserState {
        self.state
    }

    /// Starts advertising with whatever parameters and payloads were last
    /// set.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.state == AdvertiserState::Advertising {
            return Ok(());
        }
        self.cmds.set_advertise_enable(true).map_err(Error::Hci)?;
        self.state = AdvertiserState::Advertising;
        debug!("advertising started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), Error> {
        if self.state == AdvertiserState::Stopped {
            return Ok(());
        }
        self.cmds.set_advertise_enable(false).map_err(Error::Hci)?;
        self.state = AdvertiserState::Stopped;
        debug!("advertising stopped");
        Ok(())
    }

    /// Sets the advertising parameters, payload, and scan response. If
    /// currently advertising, advertising is stopped around the update and
    /// resumed after.
    pub fn update(
        &mut self,
        params: &AdvertisingParameters,
        adv: &AdvertisingData,
        scan_rsp: &AdvertisingData,
    ) -> Result<(), Error> {
        let resume = self.state == AdvertiserState::Advertising;
        if resume {
            self.stop()?;
        }
        self.set(params, adv, scan_rsp).map_err(Error::Hci)?;
        if resume {
            self.start()?;
        }
        Ok(())
    }

    fn set(
        &mut self,
        params: &AdvertisingParameters,
        adv: &AdvertisingData,
        scan_rsp: &AdvertisingData,
    ) -> Result<(), HciError> {
        self.cmds.set_advertising_parameters(params)?;
        self.cmds.set_advertising_data(adv)?;
        self.cmds.set_scan_response_data(scan_rsp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::Advertisement;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_append_name_complete() {
        let mut p = AdvPacket::new();
        p.append_name("ABCDE");
        assert_eq!(
            p.bytes(),
            &[0x06, ADV_TYPE_COMPLETE_NAME, b'A', b'B', b'C', b'D', b'E']
        );
    }

    #[test]
    fn test_append_name_exact_fit_stays_complete() {
        let mut p = AdvPacket::new();
        p.append_field(0x20, &[b'1'; 22]); // 24 bytes used
        p.append_name("ABCDE");
        assert_eq!(p.len(), 31);
        assert_eq!(p.bytes()[24], 0x06);
        assert_eq!(p.bytes()[25], ADV_TYPE_COMPLETE_NAME);
    }

    #[test]
    fn test_append_name_truncates_to_shortened() {
        let mut p = AdvPacket::new();
        p.append_field(0x20, &[b'1'; 23]); // 25 bytes used
        p.append_name("ABCDE");
        assert_eq!(p.len(), 31);
        assert_eq!(&p.bytes()[25..], &[0x05, ADV_TYPE_SHORT_NAME, b'A', b'B', b'C', b'D']);
    }

    #[test]
    fn test_append_manufacturer_data() {
        let mut p = AdvPacket::new();
        assert!(p.append_manufacturer_data_fit(0x004C, &[0xAB, 0xCD]));
        assert_eq!(
            p.bytes(),
            &[0x05, ADV_TYPE_MANUFACTURER_DATA, 0x4C, 0x00, 0xAB, 0xCD]
        );
        assert!(!p.append_manufacturer_data_fit(0x004C, &[0u8; 30]));
    }

    #[test]
    fn test_service_packet_skips_mandatory_services() {
        let uu = vec![
            Uuid::uuid16(GAP_SERVICE_UUID),
            Uuid::uuid16(GATT_SERVICE_UUID),
            Uuid::uuid16(0x180D),
        ];
        let (adv, fit) = service_advertising_packet(&uu);
        assert_eq!(fit, vec![Uuid::uuid16(0x180D)]);
        assert_eq!(
            adv.bytes(),
            &[0x02, ADV_TYPE_FLAGS, 0x06, 0x03, ADV_TYPE_SOME_UUID16, 0x0D, 0x18]
        );
    }

    #[test]
    fn test_service_packet_uuid_prefix_round_trip() {
        // Only a prefix of the 128-bit UUIDs fits alongside the flags; the
        // packet parses back to exactly that prefix.
        let uu: Vec<Uuid> = (0..4).map(|_| Uuid::random()).collect();
        let (adv, fit) = service_advertising_packet(&uu);
        assert_eq!(fit, uu[..fit.len()]);
        assert!(adv.len() <= MAX_EIR_PACKET_LENGTH);

        let parsed = Advertisement::unmarshal(adv.bytes()).unwrap();
        assert_eq!(parsed.services, fit);
        assert_eq!(parsed.flags, Some(FLAG_GENERAL_DISCOVERABLE | FLAG_LE_ONLY));
    }

    #[derive(Default)]
    struct RecordingCommands {
        enabled: AtomicBool,
        log: Mutex<Vec<String>>,
    }

    impl ControllerCommands for RecordingCommands {
        fn set_advertising_parameters(&self, _p: &AdvertisingParameters) -> Result<(), crate::error::HciError> {
            self.log.lock().unwrap().push("params".into());
            Ok(())
        }
        fn set_advertising_data(&self, d: &AdvertisingData) -> Result<(), crate::error::HciError> {
            self.log.lock().unwrap().push(format!("adv {}", d.significant_len));
            Ok(())
        }
        fn set_scan_response_data(&self, d: &AdvertisingData) -> Result<(), crate::error::HciError> {
            self.log.lock().unwrap().push(format!("scan {}", d.significant_len));
            Ok(())
        }
        fn set_advertise_enable(&self, enable: bool) -> Result<(), crate::error::HciError> {
            self.enabled.store(enable, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("enable {}", enable));
            Ok(())
        }
        fn set_scan_parameters(&self, _p: &crate::hci::ScanParameters) -> Result<(), crate::error::HciError> {
            Ok(())
        }
        fn set_scan_enable(&self, _enable: bool, _filter_duplicates: bool) -> Result<(), crate::error::HciError> {
            Ok(())
        }
        fn connect(&self, _peer: crate::gap::BdAddr) -> Result<(), crate::error::HciError> {
            Ok(())
        }
        fn disconnect(&self, _handle: u16, _reason: u8) -> Result<(), crate::error::HciError> {
            Ok(())
        }
        fn ping(&self) -> Result<(), crate::error::HciError> {
            Ok(())
        }
    }

    #[test]
    fn test_advertiser_state_machine() {
        let cmds = Arc::new(RecordingCommands::default());
        let mut adv = Advertiser::new(cmds.clone());
        assert_eq!(adv.state(), AdvertiserState::Stopped);

        let (packet, _) = service_advertising_packet(&[Uuid::uuid16(0x180D)]);
        let scan = name_scan_response_packet("gopher");
        adv.update(
            &AdvertisingParameters::default(),
            &packet.to_advertising_data(),
            &scan.to_advertising_data(),
        )
        .unwrap();
        assert_eq!(adv.state(), AdvertiserState::Stopped);

        adv.start().unwrap();
        assert_eq!(adv.state(), AdvertiserState::Advertising);
        assert!(cmds.enabled.load(Ordering::SeqCst));

        // Updating while advertising stops around the change and resumes.
        adv.update(
            &AdvertisingParameters::default(),
            &packet.to_advertising_data(),
            &scan.to_advertising_data(),
        )
        .unwrap();
        assert_eq!(adv.state(), AdvertiserState::Advertising);
        let log = cmds.log.lock().unwrap();
        let tail: Vec<&str> = log.iter().rev().take(6).map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["enable true", "scan 8", "adv 7", "params", "enable false", "enable true"]
        );
        drop(log);

        adv.stop().unwrap();
        assert_eq!(adv.state(), AdvertiserState::Stopped);
        assert!(!cmds.enabled.load(Ordering::SeqCst));
    }
}
