use crate::protocol::Push;
use crate::{ArmPosition, Attitude, ChassisFlags, ChassisPose, ChassisVelocity};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time copy of everything the robot has pushed.
#[derive(Clone, Debug, Default)]
pub struct TelemetrySnapshot {
    pub position: ChassisPose,
    pub attitude: Attitude,
    pub velocity: ChassisVelocity,
    pub status: Option<ChassisFlags>,
    pub arm: ArmPosition,
    pub gripper: Option<u8>,
    pub update_count: u64,
    pub last_update: Option<Instant>,
}

impl TelemetrySnapshot {
    /// Time since the last update, `None` if nothing arrived yet.
    pub fn age(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }
}

/// Shared, thread-safe telemetry sink. Clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct TelemetryStore {
    inner: Arc<RwLock<TelemetrySnapshot>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut TelemetrySnapshot)) {
        let mut w = self.inner.write();
        f(&mut w);
        w.update_count += 1;
        w.last_update = Some(Instant::now());
    }

    pub fn update_position(&self, pose: ChassisPose) {
        self.update(|s| s.position = pose);
    }

    pub fn update_attitude(&self, attitude: Attitude) {
        self.update(|s| s.attitude = attitude);
    }

    pub fn update_velocity(&self, velocity: ChassisVelocity) {
        self.update(|s| s.velocity = velocity);
    }

    pub fn update_status(&self, flags: ChassisFlags) {
        self.update(|s| s.status = Some(flags));
    }

    pub fn update_arm(&self, arm: ArmPosition) {
        self.update(|s| s.arm = arm);
    }

    pub fn update_gripper(&self, status: u8) {
        self.update(|s| s.gripper = Some(status));
    }

    /// Apply a parsed push. Returns false for segments the store does not track.
    pub fn apply(&self, push: &Push) -> bool {
        match push {
            Push::ChassisPosition(p) => self.update_position(*p),
            Push::ChassisAttitude(a) => self.update_attitude(*a),
            Push::ChassisStatus(f) => self.update_status(*f),
            Push::ArmPosition(a) => self.update_arm(*a),
            Push::Unknown(_) => return false,
        }
        true
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.read().clone()
    }

    pub fn position(&self) -> ChassisPose {
        self.inner.read().position
    }

    pub fn arm(&self) -> ArmPosition {
        self.inner.read().arm
    }

    pub fn reset(&self) {
        *self.inner.write() = TelemetrySnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_push;

    #[test]
    fn test_updates_counted() {
        let store = TelemetryStore::new();
        assert!(store.snapshot().age().is_none());
        let shared = store.clone();
        shared.update_position(ChassisPose::new(1.0, 2.0, 3.0));
        shared.update_arm(ArmPosition { x: 10.0, y: 20.0 });
        let snap = store.snapshot();
        assert_eq!(snap.update_count, 2);
        assert_eq!(snap.position, ChassisPose::new(1.0, 2.0, 3.0));
        assert_eq!(snap.arm.y, 20.0);
        assert!(snap.age().is_some());
    }

    #[test]
    fn test_apply_pushes() {
        let store = TelemetryStore::new();
        let applied: usize = parse_push("chassis push position 0.1 0.2; gimbal push x 1;")
            .iter()
            .filter(|p| store.apply(p))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(store.position().y, 0.2);
        store.reset();
        assert_eq!(store.snapshot().update_count, 0);
    }
}
