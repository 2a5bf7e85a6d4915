use crate::RawInput;
use core::fmt;

/// Minimum change before an axis is reported again.
const AXIS_CHANGE: f32 = 0.1;
/// Axis values at or below this magnitude are never reported.
const AXIS_FLOOR: f32 = 0.15;

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    ButtonPressed(usize),
    ButtonReleased(usize),
    Hat(i8, i8),
    Axis { index: usize, value: f32 },
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::ButtonPressed(i) => write!(f, "BUTTON {i} PRESSED"),
            InputEvent::ButtonReleased(i) => write!(f, "Button {i} released"),
            InputEvent::Hat(x, y) => write!(f, "HAT: ({x}, {y})"),
            InputEvent::Axis { index, value } => write!(f, "Axis {index}: {value:+.2}"),
        }
    }
}

/// Turns successive raw polls into change events for controller discovery.
#[derive(Debug, Default)]
pub struct InputMonitor {
    axes: Vec<f32>,
    buttons: Vec<bool>,
    hat: (i8, i8),
}

impl InputMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, raw: &RawInput) -> Vec<InputEvent> {
        let mut events = Vec::new();

        if self.buttons.len() < raw.buttons.len() {
            self.buttons.resize(raw.buttons.len(), false);
        }
        for (i, now) in raw.buttons.iter().enumerate() {
            if *now != self.buttons[i] {
                events.push(if *now {
                    InputEvent::ButtonPressed(i)
                } else {
                    InputEvent::ButtonReleased(i)
                });
                self.buttons[i] = *now;
            }
        }

        if raw.hat != self.hat {
            self.hat = raw.hat;
            events.push(InputEvent::Hat(raw.hat.0, raw.hat.1));
        }

        if self.axes.len() < raw.axes.len() {
            self.axes.resize(raw.axes.len(), 0.0);
        }
        for (i, v) in raw.axes.iter().enumerate() {
            if (v - self.axes[i]).abs() > AXIS_CHANGE {
                self.axes[i] = *v;
                if v.abs() > AXIS_FLOOR {
                    events.push(InputEvent::Axis {
                        index: i,
                        value: *v,
                    });
                }
            }
        }
        events
    }

    /// One-line summary of the current axes and pressed buttons.
    pub fn summary(raw: &RawInput) -> String {
        let axes: Vec<String> = raw
            .axes
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{i}:{v:+.1}"))
            .collect();
        let pressed: Vec<String> = raw
            .buttons
            .iter()
            .enumerate()
            .filter(|(_, p)| **p)
            .map(|(i, _)| i.to_string())
            .collect();
        let buttons = if pressed.is_empty() {
            "None pressed".to_string()
        } else {
            format!("Pressed: [{}]", pressed.join(", "))
        };
        format!("Axes: {}  Buttons: {buttons}", axes.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(axes: &[f32], buttons: &[bool], hat: (i8, i8)) -> RawInput {
        RawInput {
            axes: axes.to_vec(),
            buttons: buttons.to_vec(),
            hat,
        }
    }

    #[test]
    fn test_button_edges() {
        let mut m = InputMonitor::new();
        assert!(m.update(&raw(&[], &[false, false], (0, 0))).is_empty());
        assert_eq!(
            m.update(&raw(&[], &[false, true], (0, 0))),
            vec![InputEvent::ButtonPressed(1)]
        );
        assert!(m.update(&raw(&[], &[false, true], (0, 0))).is_empty());
        assert_eq!(
            m.update(&raw(&[], &[false, false], (0, 1))),
            vec![InputEvent::ButtonReleased(1), InputEvent::Hat(0, 1)]
        );
    }

    #[test]
    fn test_axis_thresholds() {
        let mut m = InputMonitor::new();
        // Small change: not tracked
        assert!(m.update(&raw(&[0.05], &[], (0, 0))).is_empty());
        // Tracked but inside the floor: no event
        assert!(m.update(&raw(&[0.12], &[], (0, 0))).is_empty());
        assert_eq!(
            m.update(&raw(&[0.5], &[], (0, 0))),
            vec![InputEvent::Axis {
                index: 0,
                value: 0.5
            }]
        );
        assert!(m.update(&raw(&[0.55], &[], (0, 0))).is_empty());
    }

    #[test]
    fn test_summary() {
        let s = InputMonitor::summary(&raw(&[0.0, -1.0], &[true, false, true], (0, 0)));
        assert_eq!(s, "Axes: 0:+0.0 1:-1.0  Buttons: Pressed: [0, 2]");
        assert_eq!(InputEvent::Axis { index: 3, value: -0.25 }.to_string(), "Axis 3: -0.25");
    }
}
