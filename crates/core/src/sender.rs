use std::collections::HashSet;
use std::time::Duration;

use followspot_fixtures::Fixture;

use crate::engine::{combine16, unapply_invert_bias, EngineOutput, UNIVERSE_SIZE};
use crate::error::CoreError;
use crate::input::{ControlInput, ZoomControl};
use crate::output::{Monitor, Transport, TransportError, TransportFactory};
use crate::settings::Settings;

const ZERO_FRAME: [u8; UNIVERSE_SIZE] = [0u8; UNIVERSE_SIZE];

/// Shared pan/tilt/dimmer/zoom position. Mutated only by the control tick;
/// survives release/activate cycles except where capture re-seeds it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionState {
    pub pan_pos: u16,
    pub tilt_pos: u16,
    pub dimmer: u8,
    pub zoom_val: u16,
}

/// The takeover/release state machine. Idle ⇄ Active.
///
/// Owns the transport handles (one primary plus any mirrors) while Active,
/// and the motion state always. All external triggers arrive via the
/// scheduler; nothing here is touched from other threads.
pub struct Sender {
    factory: Box<dyn TransportFactory>,
    monitor: Box<dyn Monitor>,
    pub motion: MotionState,
    session: Option<Session>,
}

struct Session {
    /// handles[0] is the primary; the rest are mirrors.
    handles: Vec<Box<dyn Transport>>,
    /// Universes that streamed at least one frame this session.
    streamed: HashSet<u16>,
    /// Universes present in the previous tick's output.
    current: HashSet<u16>,
}

impl Sender {
    pub fn new(factory: Box<dyn TransportFactory>, monitor: Box<dyn Monitor>) -> Self {
        Sender {
            factory,
            monitor,
            motion: MotionState::default(),
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Park pan/tilt at the center of the soft-limit window. Called once at
    /// scheduler start, before any capture-based seeding.
    pub fn seed_center(&mut self, settings: &Settings) {
        self.motion = MotionState {
            pan_pos: settings.pan_min / 2 + settings.pan_max / 2,
            tilt_pos: settings.tilt_min / 2 + settings.tilt_max / 2,
            dimmer: 0,
            zoom_val: 0,
        };
    }

    /// Idle → Active. Captures live network state, then opens the primary
    /// handle (first configured bind address, falling back to default
    /// routing) and one mirror per additional address. Calling while already
    /// Active is a no-op.
    pub fn activate(&mut self, settings: &Settings) -> Result<(), CoreError> {
        if self.session.is_some() {
            log::debug!("activate ignored: already active");
            return Ok(());
        }

        if settings.capture_on_activate {
            self.capture_live_state(settings);
        }

        let addrs = settings.bind_socket_addrs();
        let primary = match addrs.first() {
            Some(addr) => match self.factory.open(Some(*addr), &settings.source_name) {
                Ok(handle) => handle,
                Err(e) => {
                    log::warn!(
                        "binding {} unsupported ({}); falling back to default routing",
                        addr,
                        e
                    );
                    self.factory.open(None, &settings.source_name).map_err(|e| {
                        CoreError::TransportOpen {
                            address: Some(addr.to_string()),
                            message: e.to_string(),
                        }
                    })?
                }
            },
            None => self
                .factory
                .open(None, &settings.source_name)
                .map_err(|e| CoreError::TransportOpen {
                    address: None,
                    message: e.to_string(),
                })?,
        };

        let mut handles = vec![primary];
        for addr in addrs.iter().skip(1) {
            match self.factory.open(Some(*addr), &settings.source_name) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log::warn!("mirror bind {} unavailable, continuing without it: {}", addr, e)
                }
            }
        }

        log::info!(
            "output activated (priority {}, {} mirror(s))",
            settings.priority,
            handles.len() - 1
        );
        self.session = Some(Session {
            handles,
            streamed: HashSet::new(),
            current: HashSet::new(),
        });
        Ok(())
    }

    /// Active → Idle. Every universe that streamed during this session gets
    /// one final all-zero frame at floor priority; then all handles close.
    /// A session that never streamed sends nothing.
    pub fn release(&mut self, settings: &Settings) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if session.streamed.is_empty() {
            for handle in &mut session.handles {
                handle.close();
            }
            log::info!("stream terminated (no frames were sent)");
            return;
        }

        let floor_mask = settings
            .per_address_priority
            .then(|| [settings.priority_floor; UNIVERSE_SIZE]);
        let mut universes: Vec<u16> = session.streamed.iter().copied().collect();
        universes.sort_unstable();
        for universe in &universes {
            for handle in &mut session.handles {
                if let Err(e) = blackout(
                    handle.as_mut(),
                    *universe,
                    settings.priority_floor,
                    floor_mask.as_ref(),
                ) {
                    log::warn!("final blackout of universe {} failed: {}", universe, e);
                }
            }
        }
        for handle in &mut session.handles {
            handle.close();
        }
        log::info!("stream terminated ({} universe(s) blanked)", universes.len());
    }

    /// Integrate one tick of operator input into the motion state.
    pub fn apply_motion(&mut self, input: &ControlInput, settings: &Settings) {
        let mut speed = settings.speed;
        if input.fine {
            speed = (settings.speed / settings.fine_divisor).max(1);
        }
        let speed = speed as f32;

        self.motion.pan_pos =
            step(self.motion.pan_pos, input.pan * speed).clamp(settings.pan_min, settings.pan_max);
        self.motion.tilt_pos = step(self.motion.tilt_pos, input.tilt * speed)
            .clamp(settings.tilt_min, settings.tilt_max);

        if let Some(dimmer) = input.dimmer {
            self.motion.dimmer = dimmer;
        }

        match input.zoom {
            ZoomControl::Rate(z) => {
                self.motion.zoom_val = step(self.motion.zoom_val, z * settings.zoom_speed as f32);
            }
            ZoomControl::Absolute(v) => self.motion.zoom_val = v,
            ZoomControl::Latched => {}
        }

        // Overrides trump the throttle, patched or not.
        if input.flash {
            self.motion.dimmer = settings.flash10_level;
        }
        if input.blackout {
            self.motion.dimmer = 0;
        }
    }

    /// Push one tick's engine output to the primary and all mirrors
    /// identically, then blank any universe that dropped out since the
    /// previous tick. Push failures are logged and folded into one error so
    /// the tick can surface degraded status and retry next tick.
    pub fn push(&mut self, output: &EngineOutput, settings: &Settings) -> Result<(), CoreError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let mut first_err: Option<TransportError> = None;

        let current: HashSet<u16> = output.universes.keys().copied().collect();
        for (universe, data) in &output.universes {
            for handle in session.handles.iter_mut() {
                let result = push_universe(handle.as_mut(), *universe, data, settings);
                if let Err(e) = result {
                    log::error!("push to universe {} failed: {}", universe, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        // Universes selected last tick but not this one get blanked once and
        // then dropped from tracking.
        let mut dropped: Vec<u16> = session.current.difference(&current).copied().collect();
        dropped.sort_unstable();
        let floor_mask = settings
            .per_address_priority
            .then(|| [settings.priority_floor; UNIVERSE_SIZE]);
        for universe in dropped {
            log::info!("universe {} no longer selected; blanking", universe);
            for handle in session.handles.iter_mut() {
                if let Err(e) = blackout(
                    handle.as_mut(),
                    universe,
                    settings.priority_floor,
                    floor_mask.as_ref(),
                ) {
                    log::error!("blanking universe {} failed: {}", universe, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        session.streamed.extend(current.iter().copied());
        session.current = current;

        match first_err {
            None => Ok(()),
            Some(e) => Err(CoreError::FrameTick(e.to_string())),
        }
    }

    /// Read the live values of patched channels off the network and seed the
    /// motion state from them, so the first frame after takeover does not
    /// snap fixtures that another source is already driving. Per field, the
    /// first enabled fixture with a usable value wins; fields with no usable
    /// value keep their previous motion state.
    fn capture_live_state(&mut self, settings: &Settings) {
        let fixtures: Vec<&Fixture> = settings.fixtures.enabled().collect();
        if fixtures.is_empty() {
            return;
        }

        let mut universes: Vec<u16> = fixtures
            .iter()
            .map(|fx| effective_universe(fx, settings))
            .collect();
        universes.sort_unstable();
        universes.dedup();
        let mut observed_any = false;
        for universe in &universes {
            match self.monitor.observe(*universe) {
                Ok(()) => observed_any = true,
                Err(e) => log::warn!("cannot monitor universe {}: {}", universe, e),
            }
        }
        if !observed_any {
            return;
        }
        self.monitor
            .poll(Duration::from_millis(settings.capture_window_ms));

        let mut seeded: Vec<&str> = Vec::new();

        for fx in &fixtures {
            let universe = effective_universe(fx, settings);
            if let Some(addr) = fx.resolve_channel(fx.pan_coarse) {
                if let Some(hi) = self.monitor.last_value(universe, addr) {
                    let lo = fx
                        .resolve_channel(fx.pan_fine)
                        .and_then(|a| self.monitor.last_value(universe, a))
                        .unwrap_or(0);
                    self.motion.pan_pos =
                        unapply_invert_bias(combine16(hi, lo), fx.invert_pan, fx.pan_bias);
                    seeded.push("pan");
                    break;
                }
            }
        }

        for fx in &fixtures {
            let universe = effective_universe(fx, settings);
            if let Some(addr) = fx.resolve_channel(fx.tilt_coarse) {
                if let Some(hi) = self.monitor.last_value(universe, addr) {
                    let lo = fx
                        .resolve_channel(fx.tilt_fine)
                        .and_then(|a| self.monitor.last_value(universe, a))
                        .unwrap_or(0);
                    self.motion.tilt_pos =
                        unapply_invert_bias(combine16(hi, lo), fx.invert_tilt, fx.tilt_bias);
                    seeded.push("tilt");
                    break;
                }
            }
        }

        for fx in &fixtures {
            let universe = effective_universe(fx, settings);
            if let Some(addr) = fx.resolve_channel(fx.dimmer) {
                if let Some(value) = self.monitor.last_value(universe, addr) {
                    self.motion.dimmer = value;
                    seeded.push("dimmer");
                    break;
                }
            }
        }

        for fx in &fixtures {
            let universe = effective_universe(fx, settings);
            if let Some(addr) = fx.resolve_channel(fx.zoom) {
                if let Some(hi) = self.monitor.last_value(universe, addr) {
                    self.motion.zoom_val = match fx
                        .resolve_channel(fx.zoom_fine)
                        .and_then(|a| self.monitor.last_value(universe, a))
                    {
                        Some(lo) => combine16(hi, lo),
                        None => (hi as u16) << 8,
                    };
                    seeded.push("zoom");
                    break;
                }
            }
        }

        if seeded.is_empty() {
            log::info!("takeover capture found no live values; keeping current motion state");
        } else {
            log::info!("takeover capture seeded {} from live network state", seeded.join("/"));
        }
    }
}

fn effective_universe(fx: &Fixture, settings: &Settings) -> u16 {
    if settings.multi_universe_enabled {
        fx.universe
    } else {
        settings.default_universe
    }
}

fn step(pos: u16, delta: f32) -> u16 {
    (pos as f32 + delta).round().clamp(0.0, 65535.0) as u16
}

fn push_universe(
    handle: &mut dyn Transport,
    universe: u16,
    data: &crate::engine::UniverseOutput,
    settings: &Settings,
) -> Result<(), TransportError> {
    handle.activate_output(universe)?;
    handle.set_priority(universe, settings.priority)?;
    handle.set_per_channel_priority(universe, data.priorities.as_deref())?;
    handle.set_frame(universe, &data.frame)
}

fn blackout(
    handle: &mut dyn Transport,
    universe: u16,
    floor: u8,
    floor_mask: Option<&[u8; UNIVERSE_SIZE]>,
) -> Result<(), TransportError> {
    handle.activate_output(universe)?;
    handle.set_priority(universe, floor)?;
    if let Some(mask) = floor_mask {
        handle.set_per_channel_priority(universe, Some(mask))?;
    }
    handle.set_frame(universe, &ZERO_FRAME)
}
