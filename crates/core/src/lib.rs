pub use config::{ConfigFile, ConfigStore};
pub use controller::Controller;
pub use engine::{build_frames, ButtonActionEngine, EngineOutput, UniverseOutput, UNIVERSE_SIZE};
pub use error::CoreError;
pub use input::hid::{AxisField, HidJoystick, ReportLayout};
pub use input::{
    shape, ControlInput, EmulatedJoystick, EmulatedState, InputMapper, InputSnapshot, InputSource,
    SourceInfo, ZoomControl,
};
pub use output::{
    Monitor, SacnMonitor, SacnTransport, SacnTransportFactory, Transport, TransportError,
    TransportFactory,
};
pub use sender::{MotionState, Sender};
pub use settings::{ActionMode, ActionType, ButtonAction, Settings, PRIORITY_MAX};
pub use status::{
    slot_states, LogIndicator, NullIndicator, Status, StatusIndicator,
};

mod config;
mod controller;
mod engine;
mod error;
mod input;
pub mod output;
mod scheduler;
mod sender;
mod settings;
mod status;
