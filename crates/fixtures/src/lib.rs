use serde::{Deserialize, Serialize};

/// Hard cap on simultaneously patched fixtures.
pub const FIXTURE_LIMIT: usize = 6;

/// Highest sACN universe id.
pub const UNIVERSE_MAX: u16 = 63999;

/// A single moving-head fixture and its channel patch.
///
/// Channel fields hold DMX addresses 1-512, or 0 for "not patched". When
/// `start_addr` is set, channel numbers that fit inside the remaining
/// footprint are treated as 1-based offsets from `start_addr` instead of
/// absolute addresses (see [`Fixture::resolve_channel`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub id: String,
    pub enabled: bool,
    pub universe: u16,
    pub start_addr: u16,
    pub pan_coarse: u16,
    pub pan_fine: u16,
    pub tilt_coarse: u16,
    pub tilt_fine: u16,
    pub dimmer: u16,
    pub zoom: u16,
    pub zoom_fine: u16,
    pub color_temp_channel: u16,
    pub color_temp_value: u8,
    pub invert_pan: bool,
    pub invert_tilt: bool,
    pub pan_bias: i32,
    pub tilt_bias: i32,
    /// Status LED slot, 1-based. 0 = no slot assigned.
    pub status_led: u8,
}

impl Default for Fixture {
    fn default() -> Self {
        Fixture {
            id: String::new(),
            enabled: true,
            universe: 1,
            start_addr: 0,
            pan_coarse: 0,
            pan_fine: 0,
            tilt_coarse: 0,
            tilt_fine: 0,
            dimmer: 0,
            zoom: 0,
            zoom_fine: 0,
            color_temp_channel: 0,
            color_temp_value: 0,
            invert_pan: false,
            invert_tilt: false,
            pan_bias: 0,
            tilt_bias: 0,
            status_led: 0,
        }
    }
}

impl Fixture {
    pub fn new(id: &str) -> Self {
        Fixture {
            id: id.to_string(),
            ..Fixture::default()
        }
    }

    /// Validate and tidy a fixture coming from the administrative boundary.
    ///
    /// Returns the cleaned fixture or a validation error. Fields that can be
    /// repaired in place (whitespace ids, out-of-range LED slots, oversized
    /// biases) are repaired; fields that make the fixture unusable (empty id,
    /// illegal universe) are errors.
    pub fn normalized(mut self) -> Result<Fixture, FixtureError> {
        self.id = self.id.trim().to_string();
        if self.id.is_empty() {
            return Err(FixtureError::EmptyId);
        }
        if self.universe == 0 || self.universe > UNIVERSE_MAX {
            return Err(FixtureError::InvalidUniverse(self.universe));
        }
        if self.status_led as usize > FIXTURE_LIMIT {
            self.status_led = 0;
        }
        self.pan_bias = self.pan_bias.clamp(-65535, 65535);
        self.tilt_bias = self.tilt_bias.clamp(-65535, 65535);
        Ok(self)
    }

    /// Resolve a stored channel number to an absolute DMX address (1-512).
    ///
    /// With `start_addr > 0`, channel numbers that fit within the fixture's
    /// remaining footprint are offsets from `start_addr`; anything else is
    /// taken as already absolute. 0 and out-of-range results mean unpatched.
    pub fn resolve_channel(&self, channel: u16) -> Option<u16> {
        if channel == 0 {
            return None;
        }
        let mut ch = channel;
        if self.start_addr > 0 {
            let footprint = 512u16.saturating_sub(self.start_addr) + 1;
            if ch <= footprint {
                ch = self.start_addr + ch - 1;
            }
        }
        if (1..=512).contains(&ch) {
            Some(ch)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum FixtureError {
    EmptyId,
    InvalidUniverse(u16),
    DuplicateId(String),
    NotFound(String),
    LimitReached,
}

impl std::fmt::Display for FixtureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixtureError::EmptyId => write!(f, "fixture must have a non-empty id"),
            FixtureError::InvalidUniverse(u) => {
                write!(f, "universe {} is outside 1-{}", u, UNIVERSE_MAX)
            }
            FixtureError::DuplicateId(id) => write!(f, "duplicate fixture id: {}", id),
            FixtureError::NotFound(id) => write!(f, "no fixture with id: {}", id),
            FixtureError::LimitReached => {
                write!(f, "fixture limit of {} reached", FIXTURE_LIMIT)
            }
        }
    }
}

impl std::error::Error for FixtureError {}

/// Insertion-ordered fixture list bounded to [`FIXTURE_LIMIT`] entries with
/// unique ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FixtureSet {
    fixtures: Vec<Fixture>,
}

// Settings files written by hand (or by older builds) may carry more entries
// than the limit allows; excess entries are dropped rather than rejected.
impl<'de> Deserialize<'de> for FixtureSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut fixtures = Vec::<Fixture>::deserialize(deserializer)?;
        fixtures.truncate(FIXTURE_LIMIT);
        let mut set = FixtureSet::default();
        for fx in fixtures {
            // Skip entries that fail validation instead of refusing the file.
            if let Ok(fx) = fx.normalized() {
                let _ = set.add(fx);
            }
        }
        Ok(set)
    }
}

impl FixtureSet {
    pub fn add(&mut self, fixture: Fixture) -> Result<(), FixtureError> {
        let fixture = fixture.normalized()?;
        if self.fixtures.len() >= FIXTURE_LIMIT {
            return Err(FixtureError::LimitReached);
        }
        if self.fixtures.iter().any(|f| f.id == fixture.id) {
            return Err(FixtureError::DuplicateId(fixture.id));
        }
        self.fixtures.push(fixture);
        Ok(())
    }

    /// Replace the fixture with the given id. The stored id is preserved even
    /// if the replacement carries a different one.
    pub fn update(&mut self, id: &str, fixture: Fixture) -> Result<(), FixtureError> {
        let mut fixture = fixture.normalized()?;
        match self.fixtures.iter_mut().find(|f| f.id == id) {
            Some(slot) => {
                fixture.id = slot.id.clone();
                *slot = fixture;
                Ok(())
            }
            None => Err(FixtureError::NotFound(id.to_string())),
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<Fixture, FixtureError> {
        match self.fixtures.iter().position(|f| f.id == id) {
            Some(idx) => Ok(self.fixtures.remove(idx)),
            None => Err(FixtureError::NotFound(id.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.id == id)
    }

    /// Set the enabled flag on a fixture; returns true if the flag changed.
    /// Unknown ids are ignored.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.fixtures.iter_mut().find(|f| f.id == id) {
            Some(fx) if fx.enabled != enabled => {
                fx.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    /// Flip the enabled flag; returns the new state, or None for unknown ids.
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let fx = self.fixtures.iter_mut().find(|f| f.id == id)?;
        fx.enabled = !fx.enabled;
        Some(fx.enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter().filter(|f| f.enabled)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}
