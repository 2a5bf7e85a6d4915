use crate::{Gamepad, GamepadError, RawInput, Result};
use gilrs::{Axis, Button, GamepadId, Gilrs};

/// Buttons in Xbox/SDL index order, matching [`crate::ControllerMap::xbox`].
const BUTTON_ORDER: [Button; 11] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

#[derive(Clone, Debug)]
pub struct GamepadInfo {
    pub index: usize,
    pub name: String,
}

/// Controller read through gilrs. gilrs already normalises devices to a standard
/// layout, so raw input is synthesised in Xbox/SDL order.
pub struct GilrsGamepad {
    gilrs: Gilrs,
    id: GamepadId,
}

fn backend(e: gilrs::Error) -> GamepadError {
    GamepadError::Backend(e.to_string())
}

/// Enumerate connected controllers.
pub fn list_gamepads() -> Result<Vec<GamepadInfo>> {
    let gilrs = Gilrs::new().map_err(backend)?;
    Ok(gilrs
        .gamepads()
        .enumerate()
        .map(|(index, (_, pad))| GamepadInfo {
            index,
            name: pad.name().to_string(),
        })
        .collect())
}

impl GilrsGamepad {
    pub fn open(index: usize) -> Result<Self> {
        let mut gilrs = Gilrs::new().map_err(backend)?;
        // Drain connection events so the pad list is populated
        while gilrs.next_event().is_some() {}
        let ids: Vec<GamepadId> = gilrs.gamepads().map(|(id, _)| id).collect();
        if ids.is_empty() {
            return Err(GamepadError::NoController);
        }
        let id = *ids.get(index).ok_or(GamepadError::IndexOutOfRange {
            index,
            available: ids.len(),
        })?;
        tracing::info!(index, name = gilrs.gamepad(id).name(), "controller opened");
        Ok(Self { gilrs, id })
    }
}

impl Gamepad for GilrsGamepad {
    fn name(&self) -> String {
        self.gilrs.gamepad(self.id).name().to_string()
    }

    fn axis_count(&self) -> usize {
        6
    }

    fn button_count(&self) -> usize {
        BUTTON_ORDER.len()
    }

    fn poll(&mut self) -> Result<RawInput> {
        while self.gilrs.next_event().is_some() {}
        let pad = self
            .gilrs
            .connected_gamepad(self.id)
            .ok_or(GamepadError::Disconnected)?;
        let trigger = |b: Button| {
            let v = pad.button_data(b).map(|d| d.value()).unwrap_or(0.0);
            v * 2.0 - 1.0
        };
        // gilrs reports stick up as positive; raw input uses the SDL sign
        let axes = vec![
            pad.value(Axis::LeftStickX),
            -pad.value(Axis::LeftStickY),
            trigger(Button::LeftTrigger2),
            pad.value(Axis::RightStickX),
            -pad.value(Axis::RightStickY),
            trigger(Button::RightTrigger2),
        ];
        let buttons = BUTTON_ORDER.iter().map(|b| pad.is_pressed(*b)).collect();
        let axis_of = |neg: Button, pos: Button| -> i8 {
            i8::from(pad.is_pressed(pos)) - i8::from(pad.is_pressed(neg))
        };
        Ok(RawInput {
            axes,
            buttons,
            hat: (
                axis_of(Button::DPadLeft, Button::DPadRight),
                axis_of(Button::DPadDown, Button::DPadUp),
            ),
        })
    }
}
