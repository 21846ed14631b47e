use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use followspot_fixtures::Fixture;
use parking_lot::Mutex;

use crate::config::ConfigStore;
use crate::error::CoreError;
use crate::input::hid::ReportLayout;
use crate::input::{emulated::clamp_axis, EmulatedState, InputSnapshot};
use crate::output::{Monitor, SacnMonitor, SacnTransportFactory, TransportFactory};
use crate::scheduler::Scheduler;
use crate::sender::Sender;
use crate::settings::Settings;
use crate::status::{Status, StatusIndicator};

/// Mutable state shared between the control tick and the administrative
/// boundary, behind a single lock. The lock is held per read-modify-write
/// sequence, never across a frame push.
pub struct Shared {
    pub state: Mutex<SharedState>,
    pub stop: AtomicBool,
}

pub struct SharedState {
    pub settings: Settings,
    /// Bumped on every settings mutation; lets observers detect change
    /// without diffing.
    pub settings_version: u64,
    pub status: Status,
    pub emulated: EmulatedState,
    /// Transition requests from the administrative boundary; the scheduler
    /// consumes them on its next tick.
    pub activate_requested: bool,
    pub release_requested: bool,
    pub input_snapshot: InputSnapshot,
    /// Settings changed in memory (button-action toggles) but not yet
    /// persisted.
    pub dirty: bool,
}

impl SharedState {
    pub fn new(settings: Settings) -> Self {
        SharedState {
            settings,
            settings_version: 0,
            status: Status::default(),
            emulated: EmulatedState::default(),
            activate_requested: false,
            release_requested: false,
            input_snapshot: InputSnapshot::default(),
            dirty: false,
        }
    }
}

/// Owns the shared state, the persistence store and the scheduler thread,
/// and exposes the administrative boundary: settings, fixture CRUD,
/// activate/release, status, and the emulated input surface.
pub struct Controller {
    shared: Arc<Shared>,
    config: Mutex<ConfigStore>,
    worker: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(mut store: ConfigStore) -> Result<Self, CoreError> {
        let settings = store.load()?;
        if let Err(errors) = settings.validate() {
            return Err(CoreError::Config(errors.join(", ")));
        }
        Ok(Controller {
            shared: Arc::new(Shared {
                state: Mutex::new(SharedState::new(settings)),
                stop: AtomicBool::new(false),
            }),
            config: Mutex::new(store),
            worker: None,
        })
    }

    /// Start the control loop with explicit collaborators. Starting while
    /// already running is a no-op.
    pub fn start(
        &mut self,
        factory: Box<dyn TransportFactory>,
        monitor: Box<dyn Monitor>,
        indicator: Box<dyn StatusIndicator>,
        layout: ReportLayout,
    ) -> Result<(), CoreError> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.shared.stop.store(false, Ordering::Relaxed);
        let scheduler = Scheduler::new(
            self.shared.clone(),
            Sender::new(factory, monitor),
            indicator,
            layout,
        );
        let handle = thread::Builder::new()
            .name("control-tick".to_string())
            .spawn(move || scheduler.run())
            .map_err(|e| CoreError::Config(format!("failed to spawn control thread: {}", e)))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Start with the stock sACN transport and monitor.
    pub fn start_sacn(&mut self, indicator: Box<dyn StatusIndicator>) -> Result<(), CoreError> {
        self.start(
            Box::new(SacnTransportFactory),
            Box::new(SacnMonitor::new()),
            indicator,
            ReportLayout::default(),
        )
    }

    /// Stop the control loop (the scheduler releases with final zero frames
    /// on its way out) and persist any button-action settings changes.
    pub fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.shared.stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
        let (dirty, settings) = {
            let state = self.shared.state.lock();
            (state.dirty, state.settings.clone())
        };
        if dirty {
            match self.config.lock().update(settings) {
                Ok(()) => self.shared.state.lock().dirty = false,
                Err(e) => log::warn!("persisting settings on stop failed: {}", e),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Request takeover. The scheduler performs the transition (with its
    /// debounce) on the next tick.
    pub fn activate(&self) {
        self.shared.state.lock().activate_requested = true;
        log::info!("activate requested");
    }

    pub fn release(&self) {
        self.shared.state.lock().release_requested = true;
        log::info!("release requested");
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status.clone()
    }

    pub fn settings(&self) -> Settings {
        self.shared.state.lock().settings.clone()
    }

    /// Replace the whole settings document. Validation errors reject the
    /// update; on success it is persisted immediately.
    pub fn update_settings(&self, settings: Settings) -> Result<(), CoreError> {
        settings
            .validate()
            .map_err(|errors| CoreError::Config(errors.join(", ")))?;
        {
            let mut state = self.shared.state.lock();
            state.settings = settings.clone();
            state.settings_version += 1;
            state.dirty = false;
        }
        self.config.lock().update(settings)?;
        log::info!("settings saved");
        Ok(())
    }

    pub fn fixtures(&self) -> Vec<Fixture> {
        self.shared
            .state
            .lock()
            .settings
            .fixtures
            .iter()
            .cloned()
            .collect()
    }

    pub fn add_fixture(&self, fixture: Fixture) -> Result<(), CoreError> {
        let id = fixture.id.clone();
        let settings = {
            let mut state = self.shared.state.lock();
            state
                .settings
                .fixtures
                .add(fixture)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            state.settings_version += 1;
            state.settings.clone()
        };
        self.config.lock().update(settings)?;
        log::info!("fixture added: {}", id);
        Ok(())
    }

    pub fn update_fixture(&self, id: &str, fixture: Fixture) -> Result<(), CoreError> {
        let settings = {
            let mut state = self.shared.state.lock();
            state
                .settings
                .fixtures
                .update(id, fixture)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            state.settings_version += 1;
            state.settings.clone()
        };
        self.config.lock().update(settings)?;
        log::info!("fixture updated: {}", id);
        Ok(())
    }

    pub fn remove_fixture(&self, id: &str) -> Result<(), CoreError> {
        let settings = {
            let mut state = self.shared.state.lock();
            state
                .settings
                .fixtures
                .remove(id)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            state.settings_version += 1;
            state.settings.clone()
        };
        self.config.lock().update(settings)?;
        log::info!("fixture removed: {}", id);
        Ok(())
    }

    /// Update emulated axes; None leaves an axis untouched. Values are
    /// clamped into [-1, 1].
    pub fn set_emulated_axes(
        &self,
        x: Option<f32>,
        y: Option<f32>,
        throttle: Option<f32>,
        zaxis: Option<f32>,
    ) {
        let mut state = self.shared.state.lock();
        if let Some(v) = x {
            state.emulated.x = clamp_axis(v);
        }
        if let Some(v) = y {
            state.emulated.y = clamp_axis(v);
        }
        if let Some(v) = throttle {
            state.emulated.throttle = clamp_axis(v);
        }
        if let Some(v) = zaxis {
            state.emulated.zaxis = clamp_axis(v);
        }
    }

    pub fn press_button(&self, index: usize) {
        self.shared.state.lock().emulated.buttons.insert(index, true);
    }

    pub fn release_button(&self, index: usize) {
        self.shared.state.lock().emulated.buttons.insert(index, false);
    }

    pub fn set_emulation_enabled(&self, enabled: bool) -> Result<(), CoreError> {
        let settings = {
            let mut state = self.shared.state.lock();
            state.settings.emulated_input = enabled;
            state.settings_version += 1;
            state.settings.clone()
        };
        self.config.lock().update(settings)?;
        log::info!("emulated input {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Raw axis/button view of whatever source the scheduler is reading,
    /// refreshed once per tick.
    pub fn input_snapshot(&self) -> InputSnapshot {
        self.shared.state.lock().input_snapshot.clone()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}
