use crate::{Gamepad, RawInput, Result};
use std::collections::VecDeque;

/// Replays a fixed sequence of inputs, one per poll, then holds the last one.
#[derive(Clone, Debug, Default)]
pub struct ScriptedGamepad {
    queue: VecDeque<RawInput>,
    last: RawInput,
    polls: usize,
}

impl ScriptedGamepad {
    pub fn new(inputs: impl IntoIterator<Item = RawInput>) -> Self {
        Self {
            queue: inputs.into_iter().collect(),
            last: RawInput::default(),
            polls: 0,
        }
    }

    pub fn push(&mut self, input: RawInput) {
        self.queue.push_back(input);
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl Gamepad for ScriptedGamepad {
    fn name(&self) -> String {
        "Scripted controller".to_string()
    }

    fn axis_count(&self) -> usize {
        6
    }

    fn button_count(&self) -> usize {
        11
    }

    fn poll(&mut self) -> Result<RawInput> {
        self.polls += 1;
        if let Some(next) = self.queue.pop_front() {
            self.last = next;
        }
        Ok(self.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ControllerMap;

    #[test]
    fn test_holds_last_input() {
        let press_a = RawInput {
            buttons: vec![true],
            ..RawInput::default()
        };
        let mut pad = ScriptedGamepad::new([RawInput::default(), press_a.clone()]);
        assert!(!pad.state(&ControllerMap::xbox(), 0.15).unwrap().a);
        assert!(pad.state(&ControllerMap::xbox(), 0.15).unwrap().a);
        assert_eq!(pad.poll().unwrap(), press_a);
        assert_eq!(pad.polls(), 3);
        assert_eq!(pad.remaining(), 0);
    }
}
