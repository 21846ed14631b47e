use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use sacn::packet::ACN_SDT_MULTICAST_PORT;
use sacn::receive::SacnReceiver;

use super::TransportError;
use crate::engine::UNIVERSE_SIZE;

/// Passive network monitor, used only during the Idle → Active transition to
/// capture what other sources are currently driving.
pub trait Monitor: Send {
    /// Start listening to a universe. Idempotent.
    fn observe(&mut self, universe: u16) -> Result<(), TransportError>;

    /// Drain incoming traffic for up to `window`, updating the cache.
    fn poll(&mut self, window: Duration);

    /// Last seen value of a channel (1-512), or None if nothing usable has
    /// been observed.
    fn last_value(&self, universe: u16, channel: u16) -> Option<u8>;
}

/// Monitor backed by the `sacn` crate's E1.31 receiver.
///
/// The receiver socket is only created on first use so that deployments that
/// never capture (capture_on_activate = false) never join the multicast
/// groups.
pub struct SacnMonitor {
    receiver: Option<SacnReceiver>,
    listening: HashSet<u16>,
    frames: HashMap<u16, [u8; UNIVERSE_SIZE]>,
}

impl SacnMonitor {
    pub fn new() -> Self {
        SacnMonitor {
            receiver: None,
            listening: HashSet::new(),
            frames: HashMap::new(),
        }
    }

    fn receiver(&mut self) -> Result<&mut SacnReceiver, TransportError> {
        if self.receiver.is_none() {
            let addr = SocketAddr::from(([0, 0, 0, 0], ACN_SDT_MULTICAST_PORT));
            let receiver = SacnReceiver::with_ip(addr, None)
                .map_err(|e| TransportError(format!("open sACN receiver: {}", e)))?;
            self.receiver = Some(receiver);
        }
        Ok(self.receiver.as_mut().expect("receiver just created"))
    }

    fn store(&mut self, universe: u16, values: &[u8]) {
        // Packets may carry the start code as the first byte; only zero-start
        // (plain dimmer data) frames are usable for capture.
        let payload = if values.len() == UNIVERSE_SIZE + 1 {
            if values[0] != 0 {
                return;
            }
            &values[1..]
        } else {
            values
        };
        let entry = self.frames.entry(universe).or_insert([0u8; UNIVERSE_SIZE]);
        let n = payload.len().min(UNIVERSE_SIZE);
        entry[..n].copy_from_slice(&payload[..n]);
    }
}

impl Default for SacnMonitor {
    fn default() -> Self {
        SacnMonitor::new()
    }
}

impl Monitor for SacnMonitor {
    fn observe(&mut self, universe: u16) -> Result<(), TransportError> {
        if self.listening.contains(&universe) {
            return Ok(());
        }
        self.receiver()?
            .listen_universes(&[universe])
            .map_err(|e| TransportError(format!("listen universe {}: {}", universe, e)))?;
        self.listening.insert(universe);
        log::debug!("monitoring universe {}", universe);
        Ok(())
    }

    fn poll(&mut self, window: Duration) {
        if self.receiver.is_none() || self.listening.is_empty() {
            return;
        }
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let packets = {
                let receiver = self.receiver.as_mut().expect("checked above");
                match receiver.recv(Some(remaining)) {
                    Ok(packets) => packets,
                    // Timeouts and stray malformed packets both just mean
                    // "nothing usable yet"; keep draining until the deadline.
                    Err(_) => continue,
                }
            };
            for packet in packets {
                self.store(packet.universe, &packet.values);
            }
        }
    }

    fn last_value(&self, universe: u16, channel: u16) -> Option<u8> {
        if channel == 0 || channel as usize > UNIVERSE_SIZE {
            return None;
        }
        self.frames
            .get(&universe)
            .map(|frame| frame[(channel - 1) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_strips_start_code_and_ignores_priority_frames() {
        let mut monitor = SacnMonitor::new();

        let mut with_code = vec![0u8; UNIVERSE_SIZE + 1];
        with_code[0] = 0x00;
        with_code[1] = 99;
        monitor.store(1, &with_code);
        assert_eq!(monitor.last_value(1, 1), Some(99));

        // 0xDD per-address-priority frame must not pollute the cache
        let mut pap = vec![0u8; UNIVERSE_SIZE + 1];
        pap[0] = 0xDD;
        pap[1] = 7;
        monitor.store(1, &pap);
        assert_eq!(monitor.last_value(1, 1), Some(99));
    }

    #[test]
    fn store_accepts_bare_payloads() {
        let mut monitor = SacnMonitor::new();
        monitor.store(2, &[5, 6, 7]);
        assert_eq!(monitor.last_value(2, 2), Some(6));
        assert_eq!(monitor.last_value(2, 4), Some(0));
    }

    #[test]
    fn last_value_bounds() {
        let monitor = SacnMonitor::new();
        assert_eq!(monitor.last_value(1, 1), None);
        assert_eq!(monitor.last_value(1, 0), None);
        assert_eq!(monitor.last_value(1, 513), None);
    }
}
