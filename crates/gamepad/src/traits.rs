use crate::{ControllerMap, JoystickState, RawInput, Result};

/// A polled game controller.
pub trait Gamepad {
    fn name(&self) -> String;

    fn axis_count(&self) -> usize;

    fn button_count(&self) -> usize;

    /// Drain pending device events and return the current raw input.
    fn poll(&mut self) -> Result<RawInput>;

    fn state(&mut self, map: &ControllerMap, deadzone: f32) -> Result<JoystickState> {
        Ok(self.poll()?.to_state(map, deadzone))
    }
}

impl<G: Gamepad + ?Sized> Gamepad for Box<G> {
    fn name(&self) -> String {
        (**self).name()
    }
    fn axis_count(&self) -> usize {
        (**self).axis_count()
    }
    fn button_count(&self) -> usize {
        (**self).button_count()
    }
    fn poll(&mut self) -> Result<RawInput> {
        (**self).poll()
    }
}
