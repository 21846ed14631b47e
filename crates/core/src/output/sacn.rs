use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use sacn::source::SacnSource;

use super::{Transport, TransportError, TransportFactory};
use crate::engine::UNIVERSE_SIZE;
use crate::settings::PRIORITY_MAX;

const STARTCODE_DMX: u8 = 0x00;
const STARTCODE_PRIORITY: u8 = 0xDD;

// E1.31 wants per-address priority reasserted at least once a second.
const PRIORITY_REFRESH: Duration = Duration::from_millis(800);

/// Output sender backed by the `sacn` crate's E1.31 source.
///
/// Data frames go out as start-code-0x00 packets at the universe's source
/// priority; a per-address priority array goes out as a start-code-0xDD
/// packet whenever it changes and is refreshed alongside data frames while
/// set. Closing terminates every registered universe's stream.
pub struct SacnTransport {
    source: SacnSource,
    registered: HashSet<u16>,
    priority: HashMap<u16, u8>,
    per_channel: HashMap<u16, ([u8; UNIVERSE_SIZE], Instant)>,
}

impl SacnTransport {
    fn new(source: SacnSource) -> Self {
        SacnTransport {
            source,
            registered: HashSet::new(),
            priority: HashMap::new(),
            per_channel: HashMap::new(),
        }
    }

    fn send_priority_packet(
        &mut self,
        universe: u16,
        priorities: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), TransportError> {
        let mut data = [0u8; UNIVERSE_SIZE + 1];
        data[0] = STARTCODE_PRIORITY;
        data[1..].copy_from_slice(priorities);
        let priority = self.priority.get(&universe).copied();
        self.source
            .send(&[universe], &data, priority, None, None)
            .map_err(|e| TransportError(format!("universe {} priority send: {}", universe, e)))
    }
}

impl Transport for SacnTransport {
    fn activate_output(&mut self, universe: u16) -> Result<(), TransportError> {
        if self.registered.contains(&universe) {
            return Ok(());
        }
        self.source
            .register_universe(universe)
            .map_err(|e| TransportError(format!("register universe {}: {}", universe, e)))?;
        self.registered.insert(universe);
        log::debug!("universe {} registered for output", universe);
        Ok(())
    }

    fn set_priority(&mut self, universe: u16, priority: u8) -> Result<(), TransportError> {
        self.priority.insert(universe, priority.min(PRIORITY_MAX));
        Ok(())
    }

    fn set_per_channel_priority(
        &mut self,
        universe: u16,
        priorities: Option<&[u8; UNIVERSE_SIZE]>,
    ) -> Result<(), TransportError> {
        match priorities {
            Some(mask) => {
                let changed = self
                    .per_channel
                    .get(&universe)
                    .map(|(prev, _)| prev != mask)
                    .unwrap_or(true);
                if changed {
                    self.send_priority_packet(universe, mask)?;
                    self.per_channel.insert(universe, (*mask, Instant::now()));
                }
                Ok(())
            }
            None => {
                self.per_channel.remove(&universe);
                Ok(())
            }
        }
    }

    fn set_frame(
        &mut self,
        universe: u16,
        frame: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), TransportError> {
        let mut data = [0u8; UNIVERSE_SIZE + 1];
        data[0] = STARTCODE_DMX;
        data[1..].copy_from_slice(frame);
        let priority = self.priority.get(&universe).copied();
        self.source
            .send(&[universe], &data, priority, None, None)
            .map_err(|e| TransportError(format!("universe {} frame send: {}", universe, e)))?;

        // Keep the per-address claim alive between mask changes.
        if let Some((mask, sent)) = self.per_channel.get(&universe).copied() {
            if sent.elapsed() >= PRIORITY_REFRESH {
                self.send_priority_packet(universe, &mask)?;
                self.per_channel.insert(universe, (mask, Instant::now()));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        for universe in self.registered.drain() {
            if let Err(e) = self.source.terminate_stream(universe, STARTCODE_DMX) {
                log::warn!("terminating universe {} stream: {}", universe, e);
            }
        }
        self.priority.clear();
        self.per_channel.clear();
    }
}

impl Drop for SacnTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory opening [`SacnTransport`]s, optionally bound to a specific local
/// address.
#[derive(Debug, Default)]
pub struct SacnTransportFactory;

impl TransportFactory for SacnTransportFactory {
    fn open(
        &self,
        local: Option<SocketAddr>,
        source_name: &str,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let bind = local.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        let source = SacnSource::with_ip(source_name, bind).map_err(|e| {
            TransportError(format!("bind sACN source to {}: {}", bind, e))
        })?;
        match local {
            Some(addr) => log::info!("sACN source bound to {}", addr),
            None => log::info!("sACN source opened on default routing"),
        }
        Ok(Box::new(SacnTransport::new(source)))
    }
}
