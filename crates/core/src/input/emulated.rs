use std::collections::HashMap;

use serde::Serialize;

use super::{InputSource, SourceInfo};
use crate::settings::Settings;

/// Software joystick state, mutated by the administrative boundary and read
/// by the scheduler. Lives inside the shared-state lock.
#[derive(Debug, Clone, Serialize)]
pub struct EmulatedState {
    pub x: f32,
    pub y: f32,
    /// Like a real throttle axis: -1 = full, +1 = empty.
    pub throttle: f32,
    pub zaxis: f32,
    pub buttons: HashMap<usize, bool>,
}

impl Default for EmulatedState {
    fn default() -> Self {
        EmulatedState {
            x: 0.0,
            y: 0.0,
            throttle: -1.0,
            zaxis: 0.0,
            buttons: HashMap::new(),
        }
    }
}

/// Clamp a boundary-supplied axis value into [-1, 1]; non-finite input reads
/// as centered.
pub fn clamp_axis(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Input source backed by [`EmulatedState`].
///
/// Index lookups go through the configured axis map, so whatever index the
/// settings assign to pan/tilt/throttle/zoom reads the corresponding
/// emulated value; every other index reads neutral.
#[derive(Debug)]
pub struct EmulatedJoystick {
    state: EmulatedState,
    ax_pan: i32,
    ax_tilt: i32,
    ax_throt: i32,
    ax_zoom: i32,
}

impl EmulatedJoystick {
    pub fn new(state: EmulatedState, settings: &Settings) -> Self {
        EmulatedJoystick {
            state,
            ax_pan: settings.ax_pan,
            ax_tilt: settings.ax_tilt,
            ax_throt: settings.ax_throt,
            ax_zoom: settings.ax_zoom,
        }
    }
}

impl InputSource for EmulatedJoystick {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: "emulated".to_string(),
            axes: 4,
            buttons: 32,
        }
    }

    fn axis(&mut self, index: i32) -> f32 {
        if index < 0 {
            return 0.0;
        }
        if index == self.ax_pan {
            clamp_axis(self.state.x)
        } else if index == self.ax_tilt {
            clamp_axis(self.state.y)
        } else if index == self.ax_throt {
            clamp_axis(self.state.throttle)
        } else if index == self.ax_zoom {
            clamp_axis(self.state.zaxis)
        } else {
            0.0
        }
    }

    fn button(&mut self, index: usize) -> bool {
        self.state.buttons.get(&index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_lookup_follows_the_configured_map() {
        let settings = Settings {
            ax_pan: 3,
            ax_tilt: 0,
            ..Settings::default()
        };
        let state = EmulatedState {
            x: 0.5,
            y: -0.25,
            ..EmulatedState::default()
        };
        let mut js = EmulatedJoystick::new(state, &settings);
        assert_eq!(js.axis(3), 0.5);
        assert_eq!(js.axis(0), -0.25);
        assert_eq!(js.axis(7), 0.0);
        assert_eq!(js.axis(-1), 0.0);
    }

    #[test]
    fn throttle_defaults_to_full() {
        let settings = Settings::default();
        let mut js = EmulatedJoystick::new(EmulatedState::default(), &settings);
        assert_eq!(js.axis(settings.ax_throt), -1.0);
    }

    #[test]
    fn buttons_default_released() {
        let settings = Settings::default();
        let mut state = EmulatedState::default();
        state.buttons.insert(5, true);
        let mut js = EmulatedJoystick::new(state, &settings);
        assert!(js.button(5));
        assert!(!js.button(6));
    }

    #[test]
    fn clamp_axis_bounds_and_sanitizes() {
        assert_eq!(clamp_axis(3.0), 1.0);
        assert_eq!(clamp_axis(-3.0), -1.0);
        assert_eq!(clamp_axis(f32::NAN), 0.0);
    }
}
