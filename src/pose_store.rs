//! Thread-safe latest-robot-pose holder.
//!
//! Grounded on the capability-handle pattern of `InstrumentHandle` in the
//! teacher's `core.rs`: a small struct wrapping a lock around the one piece
//! of mutable state, with get/set methods that never expose a half-written
//! value.

use std::sync::RwLock;
use std::time::{Instant, SystemTime};

use crate::pose::Pose;

#[derive(Clone, Copy, Debug)]
struct Snapshot {
    pose: Pose,
    updated_at: Instant,
}

/// Holds the single current robot pose plus a monotonic update timestamp.
/// Readers always see either the prior complete snapshot or a new complete
/// one, never a torn write (spec §3/§5).
pub struct PoseStore {
    inner: RwLock<Option<Snapshot>>,
}

impl PoseStore {
    pub fn new() -> Self {
        PoseStore {
            inner: RwLock::new(None),
        }
    }

    /// Overwrites the stored pose and bumps the update timestamp.
    pub fn set(&self, pose: Pose) {
        let snapshot = Snapshot {
            pose,
            updated_at: Instant::now(),
        };
        *self.inner.write().expect("pose store lock poisoned") = Some(snapshot);
    }

    /// Returns the latest pose, if any has been set yet.
    pub fn get(&self) -> Option<Pose> {
        self.inner
            .read()
            .expect("pose store lock poisoned")
            .map(|s| s.pose)
    }

    /// Age of the current snapshot, or `None` if nothing has been set.
    pub fn age(&self) -> Option<std::time::Duration> {
        self.inner
            .read()
            .expect("pose store lock poisoned")
            .map(|s| s.updated_at.elapsed())
    }
}

impl Default for PoseStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock stamp attached to inbound messages that need freshness
/// checks independent of the monotonic clock used internally (e.g.
/// displacement-to-target freshness, spec §4.9 step 8).
pub fn now_wall_clock() -> SystemTime {
    SystemTime::now()
}
