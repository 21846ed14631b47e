use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use followspot_fixtures::Fixture;

use crate::settings::Settings;

/// Channels per universe.
pub const UNIVERSE_SIZE: usize = 512;

/// One universe's worth of tick output: the frame, plus the per-address
/// priority mask when per-address priority is enabled (None = uniform
/// source priority governs the whole universe).
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseOutput {
    pub frame: [u8; UNIVERSE_SIZE],
    pub priorities: Option<Box<[u8; UNIVERSE_SIZE]>>,
}

impl UniverseOutput {
    fn new(per_address: bool, floor: u8) -> Self {
        UniverseOutput {
            frame: [0u8; UNIVERSE_SIZE],
            priorities: per_address.then(|| Box::new([floor; UNIVERSE_SIZE])),
        }
    }

    /// Write one resolved channel (1-based address) and claim its priority
    /// slot. Unresolved addresses never reach here.
    fn write(&mut self, addr: u16, value: u8, priority: u8) {
        let idx = (addr - 1) as usize;
        self.frame[idx] = value;
        if let Some(mask) = &mut self.priorities {
            mask[idx] = priority;
        }
    }
}

/// The full output of one tick's frame build, keyed by universe. Rebuilt
/// from scratch every tick; a universe missing from the map was not selected
/// by any enabled fixture this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub universes: BTreeMap<u16, UniverseOutput>,
}

/// Split a 16-bit value into (coarse, fine) bytes.
pub fn split16(v: u16) -> (u8, u8) {
    ((v >> 8) as u8, (v & 0xFF) as u8)
}

/// Recombine coarse/fine bytes into the original 16-bit value.
pub fn combine16(coarse: u8, fine: u8) -> u16 {
    ((coarse as u16) << 8) | fine as u16
}

/// Per-fixture inversion then bias, clamped back into 16-bit range.
pub fn apply_invert_bias(value: u16, invert: bool, bias: i32) -> u16 {
    let v = if invert { 65535 - value as i32 } else { value as i32 };
    (v + bias).clamp(0, 65535) as u16
}

/// Undo [`apply_invert_bias`] for a value captured off the wire, so a seed
/// taken during takeover lands the motion state where the fixture already is.
pub fn unapply_invert_bias(wire: u16, invert: bool, bias: i32) -> u16 {
    let v = (wire as i32 - bias).clamp(0, 65535);
    if invert {
        (65535 - v) as u16
    } else {
        v as u16
    }
}

/// Build the per-universe frames (and priority masks) for one tick.
///
/// Enabled fixtures each resolve their patch against the shared pan/tilt/
/// dimmer/zoom state; when the fixture list is empty the legacy flat patch
/// fields drive a single fixture on the default universe. With multi-universe
/// mode off, every fixture collapses onto the default universe.
pub fn build_frames(
    pan16: u16,
    tilt16: u16,
    dimmer8: u8,
    zoom16: u16,
    settings: &Settings,
) -> EngineOutput {
    let mut out = EngineOutput::default();
    let per_address = settings.per_address_priority;
    let floor = settings.priority_floor;
    let priority = settings.priority;

    if settings.fixtures.is_empty() {
        let entry = out
            .universes
            .entry(settings.default_universe)
            .or_insert_with(|| UniverseOutput::new(per_address, floor));
        write_legacy_fixture(entry, pan16, tilt16, dimmer8, zoom16, settings, priority);
        return out;
    }

    for fx in settings.fixtures.enabled() {
        let universe = if settings.multi_universe_enabled {
            fx.universe
        } else {
            settings.default_universe
        };
        // An enabled fixture claims its universe even if nothing resolves;
        // an empty-but-present entry keeps that universe's output open.
        let entry = out
            .universes
            .entry(universe)
            .or_insert_with(|| UniverseOutput::new(per_address, floor));

        let p16 = apply_invert_bias(pan16, fx.invert_pan, fx.pan_bias)
            .clamp(settings.pan_min, settings.pan_max);
        let t16 = apply_invert_bias(tilt16, fx.invert_tilt, fx.tilt_bias)
            .clamp(settings.tilt_min, settings.tilt_max);

        let (pan_hi, pan_lo) = split16(p16);
        let (tilt_hi, tilt_lo) = split16(t16);
        if let Some(addr) = fx.resolve_channel(fx.pan_coarse) {
            entry.write(addr, pan_hi, priority);
        }
        if let Some(addr) = fx.resolve_channel(fx.pan_fine) {
            entry.write(addr, pan_lo, priority);
        }
        if let Some(addr) = fx.resolve_channel(fx.tilt_coarse) {
            entry.write(addr, tilt_hi, priority);
        }
        if let Some(addr) = fx.resolve_channel(fx.tilt_fine) {
            entry.write(addr, tilt_lo, priority);
        }

        if let Some(addr) = fx.resolve_channel(fx.dimmer) {
            entry.write(addr, dimmer8, priority);
        }

        if let Some(coarse) = fx.resolve_channel(fx.zoom) {
            let (zoom_hi, zoom_lo) = split16(zoom16);
            entry.write(coarse, zoom_hi, priority);
            if let Some(fine) = fx.resolve_channel(fx.zoom_fine) {
                entry.write(fine, zoom_lo, priority);
            }
        }

        if let Some(addr) = fx.resolve_channel(fx.color_temp_channel) {
            entry.write(addr, fx.color_temp_value, priority);
        }
    }

    out
}

/// Legacy single-fixture path: flat settings fields, absolute addresses, no
/// per-fixture invert/bias.
fn write_legacy_fixture(
    entry: &mut UniverseOutput,
    pan16: u16,
    tilt16: u16,
    dimmer8: u8,
    zoom16: u16,
    settings: &Settings,
    priority: u8,
) {
    let legacy = Fixture::default(); // start_addr 0: absolute resolution
    let (pan_hi, pan_lo) = split16(pan16);
    let (tilt_hi, tilt_lo) = split16(tilt16);

    if let Some(addr) = legacy.resolve_channel(settings.ch_pan_coarse) {
        entry.write(addr, pan_hi, priority);
    }
    if let Some(addr) = legacy.resolve_channel(settings.ch_pan_fine) {
        entry.write(addr, pan_lo, priority);
    }
    if let Some(addr) = legacy.resolve_channel(settings.ch_tilt_coarse) {
        entry.write(addr, tilt_hi, priority);
    }
    if let Some(addr) = legacy.resolve_channel(settings.ch_tilt_fine) {
        entry.write(addr, tilt_lo, priority);
    }
    if let Some(addr) = legacy.resolve_channel(settings.ch_dimmer) {
        entry.write(addr, dimmer8, priority);
    }
    if let Some(coarse) = legacy.resolve_channel(settings.ch_zoom) {
        let (zoom_hi, zoom_lo) = split16(zoom16);
        entry.write(coarse, zoom_hi, priority);
        if let Some(fine) = legacy.resolve_channel(settings.ch_zoom_fine) {
            entry.write(fine, zoom_lo, priority);
        }
    }
    if let Some(addr) = legacy.resolve_channel(settings.ch_color_temp) {
        entry.write(addr, settings.color_temp_value, priority);
    }
}

/// Throttled, change-gated frame logging for bring-up. Summaries only; full
/// dumps belong in a packet capture, not the log.
#[derive(Debug, Default)]
pub struct FrameLogger {
    last: HashMap<u16, ([u8; UNIVERSE_SIZE], Instant)>,
}

impl FrameLogger {
    pub fn maybe_log(&mut self, output: &EngineOutput, settings: &Settings) {
        if !settings.debug_log_frames {
            return;
        }
        let interval = Duration::from_millis(settings.debug_log_interval_ms);
        let now = Instant::now();
        for (universe, uni) in &output.universes {
            if let Some((prev_frame, prev_ts)) = self.last.get(universe) {
                if now.duration_since(*prev_ts) < interval {
                    continue;
                }
                if settings.debug_log_only_changes && *prev_frame == uni.frame {
                    self.last.insert(*universe, (uni.frame, now));
                    continue;
                }
            }
            log::debug!("sACN[{}] {}", universe, summarize_frame(&uni.frame));
            self.last.insert(*universe, (uni.frame, now));
        }
    }
}

fn summarize_frame(frame: &[u8; UNIVERSE_SIZE]) -> String {
    const FIRST_N: usize = 12;
    let nonzero: Vec<(usize, u8)> = frame
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0)
        .map(|(i, v)| (i + 1, *v))
        .collect();
    if nonzero.is_empty() {
        return "0 nonzero".to_string();
    }
    let head: Vec<String> = nonzero
        .iter()
        .take(FIRST_N)
        .map(|(ch, val)| format!("{}:{}", ch, val))
        .collect();
    let mut line = format!("{} nonzero -> {}", nonzero.len(), head.join(", "));
    if nonzero.len() > FIRST_N {
        line.push_str(&format!(" (+{} more)", nonzero.len() - FIRST_N));
    }
    line
}
