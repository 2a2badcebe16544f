//! Core library for the TMS robotic positioning control core.
//!
//! Holds every subsystem the `Controller` orchestrates: pose/tracker state,
//! the robot driver boundary, calibration, movement algorithms, and the
//! neuronavigation message shapes, plus the ambient configuration and error
//! types shared across all of them.

pub mod alignment;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod force;
pub mod messages;
pub mod movement;
pub mod objective;
pub mod pid;
pub mod pose;
pub mod pose_store;
pub mod remote;
pub mod robot_driver;
pub mod state_machine;
pub mod tracker;
