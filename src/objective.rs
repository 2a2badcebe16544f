//! The controller's top-level intention for the current tick (spec §3).

/// One of the three objectives the orchestrator can be pursuing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Objective {
    #[default]
    None,
    TrackTarget,
    MoveAwayFromHead,
}
