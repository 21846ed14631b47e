use chrono::{DateTime, Utc};
use followspot_fixtures::{FixtureSet, FIXTURE_LIMIT};
use serde::Serialize;

/// Snapshot of the controller's user-visible state, served verbatim to the
/// administrative boundary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    pub active: bool,
    pub error: bool,
    pub error_msg: String,
    pub device_name: String,
    pub axes: usize,
    pub buttons: usize,
    pub last_frame: Option<DateTime<Utc>>,
}

impl Status {
    pub fn set_error(&mut self, msg: impl Into<String>) {
        self.error = true;
        self.error_msg = msg.into();
    }

    pub fn clear_error(&mut self) {
        self.error = false;
        self.error_msg.clear();
    }
}

/// Status LED capability.
///
/// One concrete implementation is selected at startup; the core never
/// branches on which one is live. `set` drives the power/error pair,
/// `set_slots` the per-fixture bank.
pub trait StatusIndicator: Send {
    fn set(&mut self, active: bool, error: bool);
    fn set_slots(&mut self, states: &[bool]);
}

/// Indicator for headless deployments with no LED hardware attached.
#[derive(Debug, Default)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn set(&mut self, _active: bool, _error: bool) {}
    fn set_slots(&mut self, _states: &[bool]) {}
}

/// Mirrors LED state into the log, for bring-up and debugging.
#[derive(Debug, Default)]
pub struct LogIndicator {
    last: Option<(bool, bool)>,
    last_slots: Vec<bool>,
}

impl StatusIndicator for LogIndicator {
    fn set(&mut self, active: bool, error: bool) {
        if self.last != Some((active, error)) {
            log::info!("leds: power={} error={}", active, error);
            self.last = Some((active, error));
        }
    }

    fn set_slots(&mut self, states: &[bool]) {
        if self.last_slots != states {
            let lit: Vec<String> = states
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(i, _)| (i + 1).to_string())
                .collect();
            log::info!("fixture leds: [{}]", lit.join(", "));
            self.last_slots = states.to_vec();
        }
    }
}

/// Per-slot LED states: a slot is lit when any enabled fixture claims it.
pub fn slot_states(fixtures: &FixtureSet) -> [bool; FIXTURE_LIMIT] {
    let mut states = [false; FIXTURE_LIMIT];
    for fx in fixtures.iter() {
        let slot = fx.status_led as usize;
        if (1..=FIXTURE_LIMIT).contains(&slot) && fx.enabled {
            states[slot - 1] = true;
        }
    }
    states
}
