//! Bluetooth LE scanning control
//!
//! Scanning is driven through the controller command port; advertising
//! reports arrive through the transport collaborator's event callbacks and
//! parse with [`crate::gap::Advertisement::unmarshal`].

use crate::error::HciError;
use crate::hci::{ControllerCommands, ScanParameters};
use std::thread;
use std::time::Duration;

/// Scans for LE advertisements for `duration`, then disables scanning.
///
/// `filter_duplicates` asks the controller to report each device once per
/// scan rather than on every advertising event.
pub fn scan_le(
    cmds: &dyn ControllerCommands,
    params: &ScanParameters,
    duration: Duration,
    filter_duplicates: bool,
) -> Result<(), HciError> {
    cmds.set_scan_parameters(params)?;
    cmds.set_scan_enable(true, filter_duplicates)?;

    thread::sleep(duration);

    cmds.set_scan_enable(false, false)?;
    Ok(())
}
