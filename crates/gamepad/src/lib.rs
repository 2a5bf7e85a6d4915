//! gamepad: game controller input for teleoperation
//!
//! Devices are polled into [`RawInput`] and mapped to a [`JoystickState`]
//! through a [`ControllerMap`] and a deadzone. The default `gilrs` feature
//! reads real controllers; [`ScriptedGamepad`] replays canned input.

mod types;
pub use types::{
    apply_deadzone, AxisMap, ButtonMap, ControllerMap, ControllerPreset, JoystickState, RawInput,
    DEFAULT_DEADZONE,
};

mod error;
pub use error::{GamepadError, Result};

mod traits;
pub use traits::Gamepad;

mod scripted;
pub use scripted::ScriptedGamepad;

mod monitor;
pub use monitor::{InputEvent, InputMonitor};

#[cfg(feature = "gilrs")]
mod gilrs_backend;
#[cfg(feature = "gilrs")]
pub use gilrs_backend::{list_gamepads, GamepadInfo, GilrsGamepad};
