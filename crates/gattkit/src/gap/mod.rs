//! GAP (Generic Access Profile): device addresses, advertisement payloads,
//! and the advertising state machine.

pub mod advertising;
pub mod constants;
pub mod types;

pub use advertising::{
    name_scan_response_packet, service_advertising_packet, AdvPacket, Advertiser, AdvertiserState,
    MAX_EIR_PACKET_LENGTH,
};
pub use constants::*;
pub use types::{AddressType, Advertisement, AdvertisementError, BdAddr, Role, ServiceData};
