use std::net::{IpAddr, SocketAddr};

use followspot_fixtures::{FixtureSet, UNIVERSE_MAX};
use serde::{Deserialize, Serialize};

/// Highest priority the protocol allows for a source.
pub const PRIORITY_MAX: u8 = 200;

/// Runtime settings.
///
/// The whole struct is cheap to clone; the scheduler clones a snapshot at the
/// start of every tick rather than holding the shared lock across the frame
/// build (see `scheduler`). Unknown keys in a settings file are ignored and
/// missing keys fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Output
    pub priority: u8,
    /// Per-address priority floor applied to unwritten channels, and the
    /// priority used for final zero frames on release.
    pub priority_floor: u8,
    pub per_address_priority: bool,
    pub fps: u32,
    pub multi_universe_enabled: bool,
    pub default_universe: u16,
    /// Local addresses to bind senders to. First entry is the primary,
    /// the rest become mirrors. Empty = single sender on default routing.
    pub bind_addresses: Vec<String>,
    pub source_name: String,

    // Takeover capture
    pub capture_on_activate: bool,
    pub capture_window_ms: u64,

    // Axis mapping (indices into the input source; ax_zoom = -1 disables
    // the dedicated zoom axis and re-enables the legacy zoom-mod button)
    pub ax_pan: i32,
    pub ax_tilt: i32,
    pub ax_throt: i32,
    pub ax_zoom: i32,

    // Buttons
    pub btn_activate: usize,
    pub btn_release: usize,
    pub btn_flash10: usize,
    pub btn_dim_off: usize,
    pub btn_fine: usize,
    pub btn_zoom_mod: usize,

    // Input inversions
    pub invert_pan: bool,
    pub invert_tilt: bool,
    pub throttle_invert: bool,

    // Legacy single-fixture patch, used when the fixture list is empty.
    // The dimmer entry also gates whether throttle drives the dimmer at all.
    pub ch_pan_coarse: u16,
    pub ch_pan_fine: u16,
    pub ch_tilt_coarse: u16,
    pub ch_tilt_fine: u16,
    pub ch_dimmer: u16,
    pub ch_zoom: u16,
    pub ch_zoom_fine: u16,
    pub ch_color_temp: u16,
    pub color_temp_value: u8,

    // Soft limits (16-bit pan/tilt window)
    pub pan_min: u16,
    pub pan_max: u16,
    pub tilt_min: u16,
    pub tilt_max: u16,

    // Motion feel
    pub deadband: f32,
    pub expo: f32,
    /// 16-bit units of travel per frame at full deflection.
    pub speed: u32,
    pub fine_divisor: u32,
    pub flash10_level: u8,

    // Dedicated zoom axis feel
    pub zoom_invert: bool,
    pub zoom_deadband: f32,
    pub zoom_expo: f32,
    pub zoom_speed: u32,

    // Emulated input (software joystick); also used automatically whenever
    // no physical device is present.
    pub emulated_input: bool,

    pub button_actions: Vec<ButtonAction>,
    pub fixtures: FixtureSet,

    // Frame debug logging (throttled, change-gated)
    pub debug_log_frames: bool,
    pub debug_log_interval_ms: u64,
    pub debug_log_only_changes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            priority: 150,
            priority_floor: 0,
            per_address_priority: false,
            fps: 60,
            multi_universe_enabled: false,
            default_universe: 1,
            bind_addresses: Vec::new(),
            source_name: "FollowSpot".to_string(),

            capture_on_activate: true,
            capture_window_ms: 250,

            ax_pan: 0,
            ax_tilt: 1,
            ax_throt: 2,
            ax_zoom: -1,

            btn_activate: 5,
            btn_release: 1,
            btn_flash10: 0,
            btn_dim_off: 3,
            btn_fine: 4,
            btn_zoom_mod: 6,

            invert_pan: true,
            invert_tilt: false,
            throttle_invert: false,

            ch_pan_coarse: 1,
            ch_pan_fine: 2,
            ch_tilt_coarse: 3,
            ch_tilt_fine: 4,
            ch_dimmer: 5,
            ch_zoom: 6,
            ch_zoom_fine: 0,
            ch_color_temp: 11,
            color_temp_value: 0,

            pan_min: 2000,
            pan_max: 63000,
            tilt_min: 3000,
            tilt_max: 60000,

            deadband: 0.03,
            expo: 0.6,
            speed: 2200,
            fine_divisor: 3,
            flash10_level: 26,

            zoom_invert: false,
            zoom_deadband: 0.05,
            zoom_expo: 0.4,
            zoom_speed: 3000,

            emulated_input: true,

            button_actions: Vec::new(),
            fixtures: FixtureSet::default(),

            debug_log_frames: false,
            debug_log_interval_ms: 500,
            debug_log_only_changes: true,
        }
    }
}

impl Settings {
    /// Validate ranges; collects every violation rather than stopping at the
    /// first so the administrative boundary can report them all at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.priority > PRIORITY_MAX {
            errors.push(format!("priority must be 0-{}", PRIORITY_MAX));
        }
        if self.priority_floor > PRIORITY_MAX {
            errors.push(format!("priority_floor must be 0-{}", PRIORITY_MAX));
        }
        if self.fps == 0 || self.fps > 120 {
            errors.push("fps must be between 1 and 120".to_string());
        }
        if self.default_universe == 0 || self.default_universe > UNIVERSE_MAX {
            errors.push(format!("default_universe must be 1-{}", UNIVERSE_MAX));
        }
        if !(0.0..1.0).contains(&self.deadband) {
            errors.push("deadband must be in [0, 1)".to_string());
        }
        if !(0.0..1.0).contains(&self.zoom_deadband) {
            errors.push("zoom_deadband must be in [0, 1)".to_string());
        }
        if self.expo < 0.0 {
            errors.push("expo must be >= 0".to_string());
        }
        if self.zoom_expo < 0.0 {
            errors.push("zoom_expo must be >= 0".to_string());
        }
        if self.speed == 0 {
            errors.push("speed must be >= 1".to_string());
        }
        if self.fine_divisor == 0 {
            errors.push("fine_divisor must be >= 1".to_string());
        }
        if self.pan_min > self.pan_max {
            errors.push("pan_min must not exceed pan_max".to_string());
        }
        if self.tilt_min > self.tilt_max {
            errors.push("tilt_min must not exceed tilt_max".to_string());
        }
        for addr in &self.bind_addresses {
            if addr.parse::<IpAddr>().is_err() {
                errors.push(format!("bind address '{}' is not an IP address", addr));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Parsed bind addresses, in configuration order. Unparseable entries are
    /// skipped (validation reports them; a running loop never trips on them).
    pub fn bind_socket_addrs(&self) -> Vec<SocketAddr> {
        self.bind_addresses
            .iter()
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .map(|ip| SocketAddr::new(ip, 0))
            .collect()
    }
}

/// Joystick button → fixture action mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonAction {
    pub button: usize,
    #[serde(default)]
    pub mode: ActionMode,
    #[serde(rename = "type")]
    pub action: ActionType,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    #[default]
    Toggle,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ToggleFixture,
    EnableFixture,
    DisableFixture,
    ToggleGroup,
}
