//! Builds advertising payloads and drives the advertiser state machine
//! against a controller stub that prints each command.
//!
//! Run with: cargo run --example le_advertising

use gattkit::error::HciError;
use gattkit::gap::{name_scan_response_packet, service_advertising_packet, Advertiser};
use gattkit::hci::{AdvertisingData, AdvertisingParameters, ControllerCommands, ScanParameters};
use gattkit::{BdAddr, Uuid};
use std::sync::Arc;

struct PrintingController;

impl ControllerCommands for PrintingController {
    fn set_advertising_parameters(&self, p: &AdvertisingParameters) -> Result<(), HciError> {
        println!(
            "LE Set Advertising Parameters: interval [{:#06x}, {:#06x}] channels {:#04x}",
            p.min_interval, p.max_interval, p.channel_map
        );
        Ok(())
    }
    fn set_advertising_data(&self, d: &AdvertisingData) -> Result<(), HciError> {
        println!(
            "LE Set Advertising Data ({} significant): {}",
            d.significant_len,
            hex::encode(d.data)
        );
        Ok(())
    }
    fn set_scan_response_data(&self, d: &AdvertisingData) -> Result<(), HciError> {
        println!(
            "LE Set Scan Response Data ({} significant): {}",
            d.significant_len,
            hex::encode(d.data)
        );
        Ok(())
    }
    fn set_advertise_enable(&self, enable: bool) -> Result<(), HciError> {
        println!("LE Set Advertise Enable: {}", enable);
        Ok(())
    }
    fn set_scan_parameters(&self, _p: &ScanParameters) -> Result<(), HciError> {
        Ok(())
    }
    fn set_scan_enable(&self, _enable: bool, _filter: bool) -> Result<(), HciError> {
        Ok(())
    }
    fn connect(&self, _peer: BdAddr) -> Result<(), HciError> {
        Ok(())
    }
    fn disconnect(&self, _handle: u16, _reason: u8) -> Result<(), HciError> {
        Ok(())
    }
    fn ping(&self) -> Result<(), HciError> {
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let services: Vec<Uuid> = vec![
        "09fc95c0-c111-11e3-9904-0002a5d5c51b".parse()?,
        "af372ab4-0001-4fa4-9e22-2b4a1a2f1a6b".parse()?,
    ];

    let (adv, fit) = service_advertising_packet(&services);
    println!(
        "advertising {} of {} service UUIDs in {} bytes",
        fit.len(),
        services.len(),
        adv.len()
    );

    let scan = name_scan_response_packet("gophergatt");

    let mut advertiser = Advertiser::new(Arc::new(PrintingController));
    advertiser.update(
        &AdvertisingParameters::default(),
        &adv.to_advertising_data(),
        &scan.to_advertising_data(),
    )?;
    advertiser.start()?;
    advertiser.stop()?;

    Ok(())
}
