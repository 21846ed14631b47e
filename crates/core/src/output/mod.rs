pub mod monitor;
pub mod sacn;

use std::net::SocketAddr;

use thiserror::Error;

use crate::engine::UNIVERSE_SIZE;

pub use monitor::{Monitor, SacnMonitor};
pub use sacn::{SacnTransport, SacnTransportFactory};

/// Failure talking to (or opening) an output sender. Carried as a message;
/// the scheduler folds it into the status error surface.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// One open output connection, exclusively owned by the scheduler thread.
///
/// Implementations prepare and transmit wire frames; the core only ever
/// hands over 512-byte buffers and priority metadata. `activate_output`
/// must tolerate repeated calls for the same universe.
pub trait Transport: Send {
    fn activate_output(&mut self, universe: u16) -> Result<(), TransportError>;

    /// Set the uniform source priority used for the universe's data frames.
    fn set_priority(&mut self, universe: u16, priority: u8) -> Result<(), TransportError>;

    /// Set (or clear, with None) the per-address priority array.
    fn set_per_channel_priority(
        &mut self,
        universe: u16,
        priorities: Option<&[u8; UNIVERSE_SIZE]>,
    ) -> Result<(), TransportError>;

    fn set_frame(
        &mut self,
        universe: u16,
        frame: &[u8; UNIVERSE_SIZE],
    ) -> Result<(), TransportError>;

    fn close(&mut self);
}

/// Opens transports bound to a specific local address (None = default
/// routing). Split from [`Transport`] so activation can fan out one primary
/// plus mirrors from a single configured factory.
pub trait TransportFactory: Send {
    fn open(
        &self,
        local: Option<SocketAddr>,
        source_name: &str,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

pub mod mock {
    //! Recording test doubles for the output seam.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum MockCall {
        Activate(u16),
        Priority(u16, u8),
        PerChannelPriority(u16, Option<Vec<u8>>),
        Frame(u16, Vec<u8>),
        Close,
    }

    /// Transport that records every call into a shared log.
    pub struct MockTransport {
        pub calls: Arc<Mutex<Vec<MockCall>>>,
    }

    impl Transport for MockTransport {
        fn activate_output(&mut self, universe: u16) -> Result<(), TransportError> {
            self.calls.lock().push(MockCall::Activate(universe));
            Ok(())
        }

        fn set_priority(&mut self, universe: u16, priority: u8) -> Result<(), TransportError> {
            self.calls.lock().push(MockCall::Priority(universe, priority));
            Ok(())
        }

        fn set_per_channel_priority(
            &mut self,
            universe: u16,
            priorities: Option<&[u8; UNIVERSE_SIZE]>,
        ) -> Result<(), TransportError> {
            self.calls.lock().push(MockCall::PerChannelPriority(
                universe,
                priorities.map(|p| p.to_vec()),
            ));
            Ok(())
        }

        fn set_frame(
            &mut self,
            universe: u16,
            frame: &[u8; UNIVERSE_SIZE],
        ) -> Result<(), TransportError> {
            self.calls.lock().push(MockCall::Frame(universe, frame.to_vec()));
            Ok(())
        }

        fn close(&mut self) {
            self.calls.lock().push(MockCall::Close);
        }
    }

    /// Factory handing out [`MockTransport`]s; each open gets its own call
    /// log, retrievable afterwards in open order (clones share the log, so
    /// tests can keep one and move the other into the sender). Opens for an
    /// address in `fail_addrs` fail; `fail_default` makes default-routing
    /// opens fail.
    #[derive(Default, Clone)]
    pub struct MockFactory {
        pub logs: Arc<Mutex<Vec<(Option<SocketAddr>, Arc<Mutex<Vec<MockCall>>>)>>>,
        pub fail_addrs: Vec<SocketAddr>,
        pub fail_default: bool,
    }

    impl MockFactory {
        pub fn opened(&self) -> Vec<(Option<SocketAddr>, Arc<Mutex<Vec<MockCall>>>)> {
            self.logs.lock().clone()
        }
    }

    impl TransportFactory for MockFactory {
        fn open(
            &self,
            local: Option<SocketAddr>,
            _source_name: &str,
        ) -> Result<Box<dyn Transport>, TransportError> {
            match local {
                Some(addr) if self.fail_addrs.contains(&addr) => {
                    return Err(TransportError(format!("cannot bind {}", addr)));
                }
                None if self.fail_default => {
                    return Err(TransportError("cannot open default route".to_string()));
                }
                _ => {}
            }
            let calls = Arc::new(Mutex::new(Vec::new()));
            self.logs.lock().push((local, calls.clone()));
            Ok(Box::new(MockTransport { calls }))
        }
    }

    /// Monitor serving canned channel values.
    #[derive(Default)]
    pub struct MockMonitor {
        pub values: std::collections::HashMap<(u16, u16), u8>,
        pub observed: Arc<Mutex<Vec<u16>>>,
    }

    impl Monitor for MockMonitor {
        fn observe(&mut self, universe: u16) -> Result<(), TransportError> {
            self.observed.lock().push(universe);
            Ok(())
        }

        fn poll(&mut self, _window: std::time::Duration) {}

        fn last_value(&self, universe: u16, channel: u16) -> Option<u8> {
            self.values.get(&(universe, channel)).copied()
        }
    }
}
