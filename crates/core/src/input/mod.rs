pub mod emulated;
pub mod hid;

use serde::Serialize;

use crate::settings::Settings;

pub use emulated::{EmulatedJoystick, EmulatedState};
pub use hid::HidJoystick;

/// Identity of the connected (or emulated) input device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub axes: usize,
    pub buttons: usize,
}

/// A source of raw analog/button state.
///
/// Reads never fail: an out-of-range index or an unreadable value yields the
/// neutral value (0.0 / released) so a misconfigured axis map can never take
/// the control loop down.
pub trait InputSource {
    fn info(&self) -> SourceInfo;

    /// Raw axis value in [-1, 1]. Negative or out-of-range indices read 0.0.
    fn axis(&mut self, index: i32) -> f32;

    /// Button state. Out-of-range indices read released.
    fn button(&mut self, index: usize) -> bool;
}

/// Expo/deadband response curve, the sole nonlinearity applied to analog
/// axes: 0 inside the deadband, `sign(v) * |v|^(1+expo)` outside. The jump
/// at the deadband boundary is intentional.
pub fn shape(v: f32, expo: f32, deadband: f32) -> f32 {
    if v.abs() < deadband {
        return 0.0;
    }
    let sign = if v >= 0.0 { 1.0 } else { -1.0 };
    sign * v.abs().powf(1.0 + expo)
}

/// Zoom control for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomControl {
    /// Dedicated rocker axis: shaped rate, integrated against `zoom_speed`.
    Rate(f32),
    /// Legacy zoom-mod button held: throttle position mapped straight onto
    /// the 16-bit zoom value.
    Absolute(u16),
    /// Neither source engaged; zoom latches at its current value.
    Latched,
}

/// Everything the control tick needs from the operator, already shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlInput {
    /// Shaped pan/tilt deflection in [-1, 1], inversion applied.
    pub pan: f32,
    pub tilt: f32,
    pub zoom: ZoomControl,
    /// Throttle-derived dimmer target; None when the dimmer channel is
    /// unpatched (the running value is left untouched for this tick).
    pub dimmer: Option<u8>,
    pub fine: bool,
    pub flash: bool,
    pub blackout: bool,
    pub activate: bool,
    pub release: bool,
}

/// Reads one tick's worth of operator input and applies response shaping.
#[derive(Debug, Default)]
pub struct InputMapper;

impl InputMapper {
    pub fn read(source: &mut dyn InputSource, settings: &Settings) -> ControlInput {
        let mut x = source.axis(settings.ax_pan);
        let mut y = source.axis(settings.ax_tilt);
        if settings.invert_pan {
            x = -x;
        }
        if settings.invert_tilt {
            y = -y;
        }
        let pan = shape(x, settings.expo, settings.deadband);
        let tilt = shape(y, settings.expo, settings.deadband);

        let mut t = source.axis(settings.ax_throt);
        if settings.throttle_invert {
            t = -t;
        }
        let t01 = (t + 1.0) * 0.5;
        let dimmer = if settings.ch_dimmer > 0 {
            Some(((1.0 - t01) * 255.0).round().clamp(0.0, 255.0) as u8)
        } else {
            None
        };

        let zoom = if settings.ax_zoom >= 0 {
            let mut z = source.axis(settings.ax_zoom);
            if settings.zoom_invert {
                z = -z;
            }
            ZoomControl::Rate(shape(z, settings.zoom_expo, settings.zoom_deadband))
        } else if source.button(settings.btn_zoom_mod) {
            ZoomControl::Absolute((t01 * 65535.0).clamp(0.0, 65535.0) as u16)
        } else {
            ZoomControl::Latched
        };

        ControlInput {
            pan,
            tilt,
            zoom,
            dimmer,
            fine: source.button(settings.btn_fine),
            flash: source.button(settings.btn_flash10),
            blackout: source.button(settings.btn_dim_off),
            activate: source.button(settings.btn_activate),
            release: source.button(settings.btn_release),
        }
    }
}

/// Raw axis/button dump of the live source, for the discovery surface of the
/// administrative boundary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputSnapshot {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
}

impl InputSnapshot {
    pub fn capture(source: &mut dyn InputSource) -> Self {
        let info = source.info();
        InputSnapshot {
            axes: (0..info.axes.min(16))
                .map(|i| source.axis(i as i32))
                .collect(),
            buttons: (0..info.buttons.min(32)).map(|i| source.button(i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeSource {
        axes: Vec<f32>,
        buttons: HashMap<usize, bool>,
    }

    impl InputSource for FakeSource {
        fn info(&self) -> SourceInfo {
            SourceInfo {
                name: "fake".to_string(),
                axes: self.axes.len(),
                buttons: 8,
            }
        }

        fn axis(&mut self, index: i32) -> f32 {
            usize::try_from(index)
                .ok()
                .and_then(|i| self.axes.get(i).copied())
                .unwrap_or(0.0)
        }

        fn button(&mut self, index: usize) -> bool {
            self.buttons.get(&index).copied().unwrap_or(false)
        }
    }

    fn source(axes: Vec<f32>) -> FakeSource {
        FakeSource {
            axes,
            buttons: HashMap::new(),
        }
    }

    #[test]
    fn shape_zero_inside_deadband() {
        for v in [-0.029, -0.01, 0.0, 0.01, 0.029] {
            assert_eq!(shape(v, 0.6, 0.03), 0.0);
        }
    }

    #[test]
    fn shape_fires_exactly_at_deadband_boundary() {
        // |v| == deadband is outside the band; the discontinuity is intended.
        let v = shape(0.03, 0.6, 0.03);
        assert!(v > 0.0);
        assert_eq!(shape(-0.03, 0.6, 0.03), -v);
    }

    #[test]
    fn shape_preserves_sign_and_monotonicity() {
        assert!(shape(-0.5, 0.6, 0.03) < 0.0);
        assert!(shape(0.5, 0.6, 0.03) > 0.0);
        assert!(shape(0.8, 0.6, 0.03) > shape(0.4, 0.6, 0.03));
        // expo = 0 is the identity outside the deadband
        assert!((shape(0.5, 0.0, 0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn throttle_maps_dimmer_inversely() {
        let settings = Settings::default();
        // throttle fully forward (-1) → t01 = 0 → dimmer 255
        let mut s = source(vec![0.0, 0.0, -1.0]);
        let input = InputMapper::read(&mut s, &settings);
        assert_eq!(input.dimmer, Some(255));
        // throttle fully back (+1) → dimmer 0
        let mut s = source(vec![0.0, 0.0, 1.0]);
        let input = InputMapper::read(&mut s, &settings);
        assert_eq!(input.dimmer, Some(0));
    }

    #[test]
    fn unpatched_dimmer_leaves_value_untouched() {
        let settings = Settings {
            ch_dimmer: 0,
            ..Settings::default()
        };
        let mut s = source(vec![0.0, 0.0, -1.0]);
        assert_eq!(InputMapper::read(&mut s, &settings).dimmer, None);
    }

    #[test]
    fn global_inversion_applies_before_shaping() {
        let settings = Settings {
            invert_pan: true,
            expo: 0.0,
            deadband: 0.0,
            ..Settings::default()
        };
        let mut s = source(vec![0.5, 0.0, 0.0]);
        let input = InputMapper::read(&mut s, &settings);
        assert!((input.pan + 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_axis_reads_zero() {
        let settings = Settings {
            ax_pan: 42,
            invert_pan: false,
            ..Settings::default()
        };
        let mut s = source(vec![0.9]);
        assert_eq!(InputMapper::read(&mut s, &settings).pan, 0.0);
        let settings = Settings {
            ax_pan: -3,
            invert_pan: false,
            ..Settings::default()
        };
        assert_eq!(InputMapper::read(&mut s, &settings).pan, 0.0);
    }

    #[test]
    fn zoom_rocker_takes_precedence_over_zoom_mod() {
        let mut s = source(vec![0.0, 0.0, 0.0, 1.0]);
        s.buttons.insert(6, true); // zoom-mod held
        let settings = Settings {
            ax_zoom: 3,
            ..Settings::default()
        };
        match InputMapper::read(&mut s, &settings).zoom {
            ZoomControl::Rate(z) => assert!(z > 0.0),
            other => panic!("expected rate control, got {:?}", other),
        }
    }

    #[test]
    fn zoom_mod_maps_throttle_absolutely() {
        let mut s = source(vec![0.0, 0.0, 1.0]); // t01 = 1
        s.buttons.insert(6, true);
        let settings = Settings::default(); // ax_zoom = -1
        assert_eq!(
            InputMapper::read(&mut s, &settings).zoom,
            ZoomControl::Absolute(65535)
        );
    }

    #[test]
    fn zoom_latches_when_idle() {
        let mut s = source(vec![0.0; 4]);
        let settings = Settings::default();
        assert_eq!(InputMapper::read(&mut s, &settings).zoom, ZoomControl::Latched);
    }
}
