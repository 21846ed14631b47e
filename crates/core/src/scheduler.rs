use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::controller::Shared;
use crate::engine::{build_frames, ButtonActionEngine, FrameLogger};
use crate::error::CoreError;
use crate::input::hid::ReportLayout;
use crate::input::{EmulatedJoystick, HidJoystick, InputMapper, InputSnapshot, InputSource};
use crate::sender::Sender;
use crate::status::{slot_states, StatusIndicator};

const DEBOUNCE: Duration = Duration::from_millis(150);
const ERROR_BACKOFF: Duration = Duration::from_millis(200);
const DEVICE_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Frame rate while the input device is missing; no point burning the
/// configured rate on ticks that cannot read anything.
const DEGRADED_FPS: u32 = 10;

/// Monotonic fixed-rate ticker. Sleeps out the remainder of each frame and
/// resyncs instead of bursting after a stall.
pub struct FrameClock {
    period: Duration,
    next: Option<Instant>,
}

impl FrameClock {
    pub fn new(fps: u32) -> Self {
        FrameClock {
            period: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next: None,
        }
    }

    pub fn set_rate(&mut self, fps: u32) {
        self.period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    }

    pub fn tick(&mut self) {
        let next = match self.next {
            Some(n) => n,
            None => Instant::now() + self.period,
        };
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        }
        let after = Instant::now();
        self.next = Some(if after > next + self.period {
            after + self.period
        } else {
            next + self.period
        });
    }
}

/// The dedicated control-tick thread.
///
/// One tick: snapshot shared state → read input → button actions → debounced
/// activate/release → motion update → frame build → push. A failed tick is
/// logged, surfaces as error status and backs off briefly; only the stop flag
/// ends the loop.
pub struct Scheduler {
    shared: Arc<Shared>,
    sender: Sender,
    buttons: ButtonActionEngine,
    indicator: Box<dyn StatusIndicator>,
    layout: ReportLayout,
    physical: Option<HidJoystick>,
    frame_log: FrameLogger,
    last_activate: Option<Instant>,
    last_release: Option<Instant>,
    last_probe: Option<Instant>,
}

impl Scheduler {
    pub(crate) fn new(
        shared: Arc<Shared>,
        sender: Sender,
        indicator: Box<dyn StatusIndicator>,
        layout: ReportLayout,
    ) -> Self {
        Scheduler {
            shared,
            sender,
            buttons: ButtonActionEngine::new(),
            indicator,
            layout,
            physical: None,
            frame_log: FrameLogger::default(),
            last_activate: None,
            last_release: None,
            last_probe: None,
        }
    }

    pub(crate) fn run(mut self) {
        let settings = self.shared.state.lock().settings.clone();
        self.sender.seed_center(&settings);
        let mut clock = FrameClock::new(settings.fps);
        log::info!("control loop started at {} fps", settings.fps);

        while !self.shared.stop.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(fps) => clock.set_rate(fps),
                Err(e) => {
                    log::error!("{}", e);
                    self.shared.state.lock().status.set_error(e.to_string());
                    refresh_indicator(&self.shared, self.indicator.as_mut());
                    thread::sleep(ERROR_BACKOFF);
                }
            }
            clock.tick();
        }

        // Cooperative shutdown: release with final zero frames, then report.
        let settings = self.shared.state.lock().settings.clone();
        if self.sender.is_active() {
            self.sender.release(&settings);
            self.shared.state.lock().status.active = false;
        }
        refresh_indicator(&self.shared, self.indicator.as_mut());
        log::info!("control loop stopped");
    }

    /// One control tick. Returns the frame rate the clock should run at.
    pub(crate) fn tick(&mut self) -> Result<u32, CoreError> {
        let (mut settings, emulated, want_activate, want_release) = {
            let mut state = self.shared.state.lock();
            (
                state.settings.clone(),
                state.emulated.clone(),
                std::mem::take(&mut state.activate_requested),
                std::mem::take(&mut state.release_requested),
            )
        };

        if !settings.emulated_input && !self.manage_physical_device() {
            return Ok(DEGRADED_FPS);
        }

        let mut emulated_js;
        let source: &mut dyn InputSource = if settings.emulated_input || self.physical.is_none() {
            emulated_js = EmulatedJoystick::new(emulated, &settings);
            &mut emulated_js
        } else {
            self.physical.as_mut().expect("device checked above")
        };

        // Button → fixture actions mutate the shared fixture list directly so
        // concurrent administrative edits are not clobbered by a stale
        // snapshot; the refreshed list then drives this same tick's frames.
        if !settings.button_actions.is_empty() {
            let mut state = self.shared.state.lock();
            let changed =
                self.buttons
                    .process(source, &settings.button_actions, &mut state.settings.fixtures);
            if changed {
                state.settings_version += 1;
                state.dirty = true;
                settings.fixtures = state.settings.fixtures.clone();
                drop(state);
                refresh_indicator(&self.shared, self.indicator.as_mut());
            }
        }

        let now = Instant::now();
        let active = self.sender.is_active();

        if (source.button(settings.btn_activate) || want_activate)
            && !active
            && debounced(self.last_activate, now)
        {
            self.last_activate = Some(now);
            match self.sender.activate(&settings) {
                Ok(()) => {
                    let mut state = self.shared.state.lock();
                    state.status.active = true;
                    state.status.clear_error();
                    drop(state);
                    log::info!("activate pressed, taking control");
                    refresh_indicator(&self.shared, self.indicator.as_mut());
                }
                Err(e) => {
                    log::error!("{}", e);
                    self.shared.state.lock().status.set_error(e.to_string());
                    refresh_indicator(&self.shared, self.indicator.as_mut());
                }
            }
        }

        if (source.button(settings.btn_release) || want_release)
            && self.sender.is_active()
            && debounced(self.last_release, now)
        {
            self.last_release = Some(now);
            self.sender.release(&settings);
            self.shared.state.lock().status.active = false;
            log::info!("release pressed, stream terminated");
            refresh_indicator(&self.shared, self.indicator.as_mut());
        }

        if self.sender.is_active() {
            let input = InputMapper::read(source, &settings);
            self.sender.apply_motion(&input, &settings);
            let motion = self.sender.motion;
            let output = build_frames(
                motion.pan_pos,
                motion.tilt_pos,
                motion.dimmer,
                motion.zoom_val,
                &settings,
            );
            self.frame_log.maybe_log(&output, &settings);
            self.sender.push(&output, &settings)?;
            self.shared.state.lock().status.last_frame = Some(Utc::now());
        }

        self.shared.state.lock().input_snapshot = InputSnapshot::capture(source);
        Ok(settings.fps)
    }

    /// Keep the physical device alive, probing for it at a reduced rate when
    /// absent. Returns false when there is nothing to read this tick.
    fn manage_physical_device(&mut self) -> bool {
        if let Some(device) = self.physical.as_mut() {
            if device.poll().is_ok() {
                return true;
            }
            self.physical = None;
            let mut state = self.shared.state.lock();
            state.status.device_name.clear();
            state.status.axes = 0;
            state.status.buttons = 0;
            state.status.set_error("input device lost");
            drop(state);
            refresh_indicator(&self.shared, self.indicator.as_mut());
        }

        let due = self
            .last_probe
            .map_or(true, |t| t.elapsed() >= DEVICE_PROBE_INTERVAL);
        if due {
            self.last_probe = Some(Instant::now());
            match HidJoystick::open(self.layout.clone()) {
                Ok(device) => {
                    let info = device.info();
                    log::info!(
                        "joystick: {} (axes={} buttons={})",
                        info.name,
                        info.axes,
                        info.buttons
                    );
                    let mut state = self.shared.state.lock();
                    state.status.device_name = info.name;
                    state.status.axes = info.axes;
                    state.status.buttons = info.buttons;
                    state.status.clear_error();
                    drop(state);
                    self.physical = Some(device);
                    refresh_indicator(&self.shared, self.indicator.as_mut());
                    return true;
                }
                Err(_) => {
                    let mut state = self.shared.state.lock();
                    if !state.status.error {
                        state.status.set_error("no input device detected");
                        drop(state);
                        refresh_indicator(&self.shared, self.indicator.as_mut());
                    }
                }
            }
        }
        false
    }

}

fn refresh_indicator(shared: &Shared, indicator: &mut dyn StatusIndicator) {
    let (active, error, slots) = {
        let state = shared.state.lock();
        (
            state.status.active,
            state.status.error,
            slot_states(&state.settings.fixtures),
        )
    };
    indicator.set(active, error);
    indicator.set_slots(&slots);
}

fn debounced(last: Option<Instant>, now: Instant) -> bool {
    last.map_or(true, |t| now.duration_since(t) >= DEBOUNCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SharedState;
    use crate::output::mock::{MockCall, MockFactory, MockMonitor};
    use crate::settings::Settings;
    use crate::status::NullIndicator;
    use followspot_fixtures::Fixture;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;

    fn test_settings() -> Settings {
        let mut settings = Settings {
            pan_min: 0,
            pan_max: 65535,
            tilt_min: 0,
            tilt_max: 65535,
            capture_on_activate: false,
            emulated_input: true,
            ..Settings::default()
        };
        settings
            .fixtures
            .add(Fixture {
                pan_coarse: 1,
                pan_fine: 2,
                dimmer: 5,
                ..Fixture::new("Left")
            })
            .unwrap();
        settings
    }

    fn shared_with(settings: Settings) -> Arc<Shared> {
        Arc::new(Shared {
            state: Mutex::new(SharedState::new(settings)),
            stop: AtomicBool::new(false),
        })
    }

    fn scheduler_with(shared: Arc<Shared>, factory: &MockFactory) -> Scheduler {
        let sender = Sender::new(Box::new(factory.clone()), Box::new(MockMonitor::default()));
        Scheduler::new(
            shared,
            sender,
            Box::new(NullIndicator),
            ReportLayout::default(),
        )
    }

    #[test]
    fn admin_activate_flag_opens_output_and_streams() {
        let factory = MockFactory::default();
        let shared = shared_with(test_settings());
        let mut scheduler = scheduler_with(shared.clone(), &factory);

        shared.state.lock().activate_requested = true;
        scheduler.tick().unwrap();

        assert!(shared.state.lock().status.active);
        let opened = factory.opened();
        assert_eq!(opened.len(), 1);
        // the activation tick already pushed a frame
        assert!(opened[0]
            .1
            .lock()
            .iter()
            .any(|c| matches!(c, MockCall::Frame(1, _))));
        assert!(shared.state.lock().status.last_frame.is_some());
    }

    #[test]
    fn release_debounces_against_reactivation() {
        let factory = MockFactory::default();
        let shared = shared_with(test_settings());
        let mut scheduler = scheduler_with(shared.clone(), &factory);

        shared.state.lock().activate_requested = true;
        scheduler.tick().unwrap();
        assert!(shared.state.lock().status.active);

        shared.state.lock().release_requested = true;
        scheduler.tick().unwrap();
        assert!(!shared.state.lock().status.active);

        // immediate re-activation is debounced away
        shared.state.lock().activate_requested = true;
        scheduler.tick().unwrap();
        assert!(!shared.state.lock().status.active);
    }

    #[test]
    fn emulated_button_triggers_activation() {
        let factory = MockFactory::default();
        let settings = test_settings();
        let btn = settings.btn_activate;
        let shared = shared_with(settings);
        let mut scheduler = scheduler_with(shared.clone(), &factory);

        shared.state.lock().emulated.buttons.insert(btn, true);
        scheduler.tick().unwrap();
        assert!(shared.state.lock().status.active);
    }

    #[test]
    fn button_action_toggle_lands_in_same_tick_frame() {
        let factory = MockFactory::default();
        let mut settings = test_settings();
        settings.button_actions = vec![crate::settings::ButtonAction {
            button: 9,
            mode: crate::settings::ActionMode::Toggle,
            action: crate::settings::ActionType::ToggleFixture,
            targets: vec!["Left".to_string()],
        }];
        let shared = shared_with(settings);
        let mut scheduler = scheduler_with(shared.clone(), &factory);

        shared.state.lock().activate_requested = true;
        scheduler.tick().unwrap();

        // press the toggle button: fixture disables, and the same tick's
        // output no longer selects its universe
        shared.state.lock().emulated.buttons.insert(9, true);
        scheduler.tick().unwrap();

        let state = shared.state.lock();
        assert!(!state.settings.fixtures.get("Left").unwrap().enabled);
        assert!(state.dirty);
        assert_eq!(state.settings_version, 1);
    }

    #[test]
    fn motion_flows_from_emulated_stick_to_frames() {
        let factory = MockFactory::default();
        let shared = shared_with(test_settings());
        let mut scheduler = scheduler_with(shared.clone(), &factory);

        shared.state.lock().activate_requested = true;
        scheduler.tick().unwrap();

        {
            let mut state = shared.state.lock();
            // invert_pan defaults true; push the stick negative to move up
            state.emulated.x = -1.0;
        }
        scheduler.tick().unwrap();

        let opened = factory.opened();
        let calls = opened[0].1.lock();
        let frames: Vec<&Vec<u8>> = calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Frame(1, f) => Some(f),
                _ => None,
            })
            .collect();
        assert!(frames.len() >= 2);
        let first = u16::from_be_bytes([frames[0][0], frames[0][1]]);
        let second = u16::from_be_bytes([frames[1][0], frames[1][1]]);
        assert!(second > first, "pan should have advanced: {} -> {}", first, second);
    }

    #[test]
    fn frame_clock_paces_ticks() {
        let mut clock = FrameClock::new(200);
        let start = Instant::now();
        clock.tick();
        clock.tick();
        clock.tick();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
