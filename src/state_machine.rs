//! Five-state execution guard around the robot driver (spec §4.6).
//!
//! Transition logic is ground-truthed line-for-line against the state
//! controller this crate's behaviour must match: `not_moving_counter`
//! inference for movement finishing before it was observed, a dwell-time
//! gated WAITING state, and a `dwell_time == 0` no-op on
//! `set_state_to_start_moving` for drivers that manage completion
//! internally.

use std::time::{Duration, Instant};

use log::info;

/// One of the five states the robot driver guard can be in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RobotState {
    Ready,
    StartMoving,
    Moving,
    Waiting,
    Stopping,
}

const NOT_MOVING_GRACE_TICKS: u32 = 10;

/// Drives the robot state machine from driver `is_moving()` polls. Holds
/// no reference to the driver itself; the caller passes the latest
/// `is_moving` reading into `update()` each tick.
pub struct RobotStateMachine {
    state: RobotState,
    previous_state: Option<RobotState>,
    dwell_time: Duration,
    not_moving_counter: u32,
    waiting_start: Option<Instant>,
    remaining_dwell_time: Duration,
}

impl RobotStateMachine {
    pub fn new(dwell_time: Duration) -> Self {
        RobotStateMachine {
            state: RobotState::Ready,
            previous_state: None,
            dwell_time,
            not_moving_counter: 0,
            waiting_start: None,
            remaining_dwell_time: Duration::ZERO,
        }
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn remaining_dwell_time(&self) -> Duration {
        self.remaining_dwell_time
    }

    /// Advances the machine given the driver's current `is_moving` reading.
    pub fn update(&mut self, is_moving: bool) {
        self.previous_state = Some(self.state);
        let mut stopped_moving = false;

        if self.state == RobotState::StartMoving {
            if is_moving {
                self.state = RobotState::Moving;
            } else {
                self.not_moving_counter += 1;
                if self.not_moving_counter > NOT_MOVING_GRACE_TICKS {
                    stopped_moving = true;
                }
            }
        }

        if self.state == RobotState::Moving && !is_moving {
            stopped_moving = true;
        }

        if stopped_moving {
            self.state = RobotState::Waiting;
            self.waiting_start = Some(Instant::now());
        }

        if self.state == RobotState::Waiting {
            let waited_for = self
                .waiting_start
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            self.remaining_dwell_time = self.dwell_time.saturating_sub(waited_for);
            if self.remaining_dwell_time.is_zero() {
                self.state = RobotState::Ready;
            }
        }

        if self.state == RobotState::Stopping && !is_moving {
            self.state = RobotState::Ready;
        }

        self.log_transition();
    }

    fn log_transition(&self) {
        if self.previous_state == Some(self.state) {
            return;
        }
        match self.state {
            RobotState::Ready => info!("Robot state: READY"),
            RobotState::StartMoving => info!("Robot state: START_MOVING"),
            RobotState::Moving => info!("Robot state: MOVING"),
            RobotState::Waiting => info!(
                "Robot state: WAITING, remaining dwell time: {:.2} s",
                self.remaining_dwell_time.as_secs_f64()
            ),
            RobotState::Stopping => info!("Robot state: STOPPING"),
        }
    }

    /// No-op when `dwell_time == 0` (drivers that manage motion completion
    /// internally, per spec §4.6).
    pub fn set_state_to_start_moving(&mut self) {
        if self.dwell_time.is_zero() {
            return;
        }
        self.state = RobotState::StartMoving;
        self.not_moving_counter = 0;
    }

    pub fn set_state_to_stopping(&mut self) {
        self.state = RobotState::Stopping;
    }
}
