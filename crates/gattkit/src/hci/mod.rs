//! The HCI facade consumed by the GATT core
//!
//! The HCI transport itself (kernel sockets, command serialization, ACL
//! framing) lives in a collaborator; this module defines the command port
//! the core drives, the adapter state model, the bounded window for
//! outstanding ACL packets, and the controller liveness heartbeat.

use crate::error::HciError;
use crate::gap::BdAddr;
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Disconnect reason issued when the host tears a connection down
/// (Remote User Terminated Connection).
pub const DISCONNECT_REASON_REMOTE_USER: u8 = 0x13;

/// States of the Bluetooth adapter, reported through the state-change
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unsupported => "Unsupported",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::PoweredOn => "PoweredOn",
        };
        f.write_str(s)
    }
}

/// A 31-byte advertising or scan-response buffer with its significant
/// length. The core writes the significant bytes at offset 0 and zero-pads
/// the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvertisingData {
    pub significant_len: u8,
    pub data: [u8; 31],
}

impl AdvertisingData {
    /// Packs the significant bytes, truncating at 31.
    pub fn from_bytes(b: &[u8]) -> Self {
        let mut data = [0u8; 31];
        let n = b.len().min(31);
        data[..n].copy_from_slice(&b[..n]);
        AdvertisingData {
            significant_len: n as u8,
            data,
        }
    }

    pub fn significant(&self) -> &[u8] {
        &self.data[..self.significant_len as usize]
    }
}

/// Advertising timing parameters, in 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    pub min_interval: u16,
    pub max_interval: u16,
    pub channel_map: u8,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        // 152.5 ms on all three advertising channels.
        AdvertisingParameters {
            min_interval: 0x00F4,
            max_interval: 0x00F4,
            channel_map: 0x07,
        }
    }
}

/// Scan timing parameters, in 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParameters {
    /// Active scanning requests scan responses; passive does not.
    pub active: bool,
    pub interval: u16,
    pub window: u16,
}

impl Default for ScanParameters {
    fn default() -> Self {
        ScanParameters {
            active: true,
            interval: 0x0010,
            window: 0x0010,
        }
    }
}

/// The command port of the HCI collaborator. Implementations issue the
/// corresponding HCI commands and block until the controller acknowledges.
pub trait ControllerCommands: Send + Sync {
    fn set_advertising_parameters(&self, params: &AdvertisingParameters) -> Result<(), HciError>;
    fn set_advertising_data(&self, data: &AdvertisingData) -> Result<(), HciError>;
    fn set_scan_response_data(&self, data: &AdvertisingData) -> Result<(), HciError>;
    fn set_advertise_enable(&self, enable: bool) -> Result<(), HciError>;
    fn set_scan_parameters(&self, params: &ScanParameters) -> Result<(), HciError>;
    fn set_scan_enable(&self, enable: bool, filter_duplicates: bool) -> Result<(), HciError>;
    fn connect(&self, peer: BdAddr) -> Result<(), HciError>;
    fn disconnect(&self, handle: u16, reason: u8) -> Result<(), HciError>;
    /// A trivial command used as a liveness probe.
    fn ping(&self) -> Result<(), HciError>;
}

/// Default number of outstanding ACL packets the controller accepts.
pub const DEFAULT_ACL_WINDOW: usize = 15;

/// A bounded window of outstanding ACL packets. `acquire` blocks while the
/// window is full; each Number-Of-Completed-Packets event releases slots via
/// `complete`.
pub struct AclWindow {
    cap: usize,
    in_flight: Mutex<usize>,
    freed: Condvar,
}

impl AclWindow {
    pub fn new(cap: usize) -> Self {
        AclWindow {
            cap,
            in_flight: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    /// Claims a slot for one outgoing packet, blocking while the window is
    /// full.
    pub fn acquire(&self) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *in_flight >= self.cap {
            in_flight = match self.freed.wait(in_flight) {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *in_flight += 1;
    }

    /// Releases `n` slots on a Number-Of-Completed-Packets event.
    pub fn complete(&self, n: usize) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *in_flight = in_flight.saturating_sub(n);
        self.freed.notify_all();
    }

    pub fn in_flight(&self) -> usize {
        match self.in_flight.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Default for AclWindow {
    fn default() -> Self {
        AclWindow::new(DEFAULT_ACL_WINDOW)
    }
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const HEARTBEAT_DEADLINE: Duration = Duration::from_secs(30);

/// Periodically probes the controller with a trivial command. If no probe
/// succeeds within the deadline the on-dead callback fires once; the owner
/// is expected to close the server and report the adapter as Unknown.
pub struct Heartbeat {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
    dead: Arc<AtomicBool>,
}

impl Heartbeat {
    pub fn spawn<F>(cmds: Arc<dyn ControllerCommands>, on_dead: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (stop, stopped) = channel();
        let dead = Arc::new(AtomicBool::new(false));
        let dead_flag = Arc::clone(&dead);

        let thread = thread::spawn(move || {
            let mut on_dead = Some(on_dead);
            let mut last_ok = Instant::now();
            loop {
                match stopped.recv_timeout(HEARTBEAT_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                match cmds.ping() {
                    Ok(()) => last_ok = Instant::now(),
                    Err(e) => {
                        debug!("controller heartbeat failed: {}", e);
                        if last_ok.elapsed() >= HEARTBEAT_DEADLINE {
                            warn!("controller missed heartbeat deadline, closing");
                            dead_flag.store(true, Ordering::SeqCst);
                            if let Some(f) = on_dead.take() {
                                f();
                            }
                            return;
                        }
                    }
                }
            }
        });

        Heartbeat {
            stop,
            thread: Some(thread),
            dead,
        }
    }

    /// Whether the deadline has expired and the on-dead callback fired.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Stops the probe thread and waits for it to exit.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertising_data_pads_to_31() {
        let d = AdvertisingData::from_bytes(&[0x02, 0x01, 0x06]);
        assert_eq!(d.significant_len, 3);
        assert_eq!(d.significant(), &[0x02, 0x01, 0x06]);
        assert_eq!(d.data.len(), 31);
        assert!(d.data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_acl_window_blocks_and_releases() {
        let w = Arc::new(AclWindow::new(2));
        w.acquire();
        w.acquire();
        assert_eq!(w.in_flight(), 2);

        let w2 = Arc::clone(&w);
        let t = thread::spawn(move || {
            // Blocks until a slot frees up.
            w2.acquire();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!t.is_finished());

        w.complete(1);
        t.join().unwrap();
        assert_eq!(w.in_flight(), 2);

        w.complete(5);
        assert_eq!(w.in_flight(), 0);
    }
}
