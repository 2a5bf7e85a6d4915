//! Bounded, time-indexed ring of camera frames and raw commands.

use crate::actions::{ActionRanges, RawAction};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use vision::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraSlot {
    Robot,
    Webcam,
}

impl CameraSlot {
    pub fn feature(self) -> &'static str {
        match self {
            CameraSlot::Robot => "observation.images.robot",
            CameraSlot::Webcam => "observation.images.top",
        }
    }
}

#[derive(Debug, Default)]
struct Rings {
    robot: VecDeque<(f64, Arc<Frame>)>,
    webcam: VecDeque<(f64, Arc<Frame>)>,
    commands: VecDeque<(f64, RawAction)>,
}

impl Rings {
    fn frames(&self, slot: CameraSlot) -> &VecDeque<(f64, Arc<Frame>)> {
        match slot {
            CameraSlot::Robot => &self.robot,
            CameraSlot::Webcam => &self.webcam,
        }
    }

    fn frames_mut(&mut self, slot: CameraSlot) -> &mut VecDeque<(f64, Arc<Frame>)> {
        match slot {
            CameraSlot::Robot => &mut self.robot,
            CameraSlot::Webcam => &mut self.webcam,
        }
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, cap: usize, item: T) {
    if ring.len() >= cap {
        ring.pop_front();
    }
    ring.push_back(item);
}

/// Timestamps are seconds on the caller's clock; the buffer only compares them.
#[derive(Debug)]
pub struct FrameBuffer {
    max_frames: usize,
    max_commands: usize,
    rings: Mutex<Rings>,
}

impl FrameBuffer {
    pub fn new(duration: f64, fps: u32) -> Self {
        let max_frames = ((duration * f64::from(fps)).round() as usize).max(1);
        Self {
            max_frames,
            max_commands: max_frames * 10,
            rings: Mutex::new(Rings::default()),
        }
    }

    pub fn capacity(&self) -> (usize, usize) {
        (self.max_frames, self.max_commands)
    }

    pub fn add_frame(&self, slot: CameraSlot, t: f64, frame: Arc<Frame>) {
        let mut rings = self.rings.lock();
        push_bounded(rings.frames_mut(slot), self.max_frames, (t, frame));
    }

    pub fn add_command(&self, t: f64, action: RawAction) {
        let mut rings = self.rings.lock();
        push_bounded(&mut rings.commands, self.max_commands, (t, action));
    }

    pub fn len(&self, slot: CameraSlot) -> usize {
        self.rings.lock().frames(slot).len()
    }

    pub fn command_count(&self) -> usize {
        self.rings.lock().commands.len()
    }

    /// Frame closest to `t + offset`; the earliest wins on ties.
    pub fn frame_at(&self, t: f64, slot: CameraSlot, offset: f64) -> Option<Arc<Frame>> {
        let target = t + offset;
        let rings = self.rings.lock();
        let mut best: Option<(f64, &Arc<Frame>)> = None;
        for (ts, frame) in rings.frames(slot) {
            let d = (ts - target).abs();
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, frame));
            }
        }
        best.map(|(_, f)| Arc::clone(f))
    }

    /// Combine commands with timestamps in `(start, end]`. Magnitudes add up,
    /// `arm_recenter` is an OR, and gripper powers are clipped to their range.
    pub fn aggregate(&self, start: f64, end: f64, ranges: &ActionRanges) -> RawAction {
        let rings = self.rings.lock();
        let mut acc = RawAction::default();
        for (_, a) in rings.commands.iter().filter(|(t, _)| *t > start && *t <= end) {
            acc.move_x += a.move_x;
            acc.move_y += a.move_y;
            acc.rotate_z += a.rotate_z;
            acc.gripper_open += a.gripper_open;
            acc.gripper_close += a.gripper_close;
            acc.arm_x += a.arm_x;
            acc.arm_y += a.arm_y;
            if a.arm_recenter > 0.0 {
                acc.arm_recenter = 1.0;
            }
        }
        let clip = |v: f64, name: &str| {
            let (lo, hi) = ranges.get(name).unwrap_or((0.0, 100.0));
            v.clamp(lo.min(hi), lo.max(hi))
        };
        acc.gripper_open = clip(acc.gripper_open, "gripper_open");
        acc.gripper_close = clip(acc.gripper_close, "gripper_close");
        acc
    }

    pub fn clear(&self) {
        let mut rings = self.rings.lock();
        rings.robot.clear();
        rings.webcam.clear();
        rings.commands.clear();
    }
}
