//! Outbound publishing to neuronavigation, and the debug-visualisation
//! side channel.
//!
//! Spec §9 flags the original point-of-application visualiser as reading a
//! process-wide temp file the controller happens to write; the preferred
//! refactor is an explicit sink interface the controller publishes
//! samples to, with the temp-file consumer as one implementation. That is
//! what `RemoteControlSink` and `TempFileSink` are here.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::messages::OutboundMessage;

/// Receives every [`OutboundMessage`] the controller publishes. The real
/// neuronavigation relay link implements this out of core scope (spec
/// §1/§6); this crate ships the debug-visualisation file sink only.
pub trait RemoteControlSink: Send {
    fn publish(&mut self, message: &OutboundMessage);
}

/// Writes the coil point-of-application to a process-wide temp file on
/// every publish, mirroring `const.TEMP_FILE`'s contract: created and
/// truncated at construction, removed at shutdown.
pub struct TempFileSink {
    path: PathBuf,
    file: File,
}

impl TempFileSink {
    pub fn new() -> io::Result<Self> {
        Self::at_path(std::env::temp_dir().join("tms_robot_control_debug.tmp"))
    }

    pub fn at_path(path: PathBuf) -> io::Result<Self> {
        let file = File::create(&path)?;
        Ok(TempFileSink { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RemoteControlSink for TempFileSink {
    fn publish(&mut self, message: &OutboundMessage) {
        if let OutboundMessage::UpdateZOffsetTarget { stable } = message {
            // Best-effort: a dropped debug sample never fails the tick.
            let _ = writeln!(self.file, "z_offset_stable={stable}");
        }
    }
}

impl Drop for TempFileSink {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A sink that discards everything, for configurations with no debug
/// visualiser attached.
pub struct NullSink;

impl RemoteControlSink for NullSink {
    fn publish(&mut self, _message: &OutboundMessage) {}
}
