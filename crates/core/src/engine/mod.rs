pub mod buttons;
pub mod frame;

pub use buttons::ButtonActionEngine;
pub use frame::{
    apply_invert_bias, build_frames, combine16, split16, unapply_invert_bias, EngineOutput,
    FrameLogger, UniverseOutput, UNIVERSE_SIZE,
};
