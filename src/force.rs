//! Force/pressure feedback: buffered samples, stability queries, dedup.
//!
//! Polymorphic over a single-axis pressure transport and a six-axis
//! force/torque transport (spec §4.2). Both share the same size-100 ring
//! buffer and stability math; only how a raw sample reduces to "the value"
//! differs. The ring buffer reuses `ringbuf`, the same crate the host
//! application already depends on for buffered sample streams.

use ringbuf::{HeapRb, Rb};

const BUFFER_CAPACITY: usize = 100;
const DEFAULT_FORCE_TOLERANCE_N: f64 = 0.5;
const DEFAULT_PRESSURE_TOLERANCE_KPA: f64 = 0.2;
const STABILITY_STD_DEV_THRESHOLD: f64 = 0.3;

/// One axis of a six-axis force/torque reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForceAxis {
    Fx,
    Fy,
    Fz,
    Tx,
    Ty,
    Tz,
}

/// A raw sample pulled from the underlying transport.
#[derive(Clone, Copy, Debug)]
pub enum RawSample {
    Pressure(f64),
    SixAxis([f64; 6]),
}

/// Pulls pending raw samples from the physical transport. Implemented by
/// the out-of-scope serial reader in production, and by a synthetic
/// generator in tests.
pub trait ForceTransport {
    /// Drains whatever samples have arrived since the last poll. A
    /// transient read error is absorbed: return an empty vec rather than
    /// propagating, per spec §4.2/§7.
    fn poll(&mut self) -> Vec<RawSample>;
}

/// Projects a raw sample onto one axis. Pressure samples ignore `axis` and
/// return their single scalar.
fn project(sample: RawSample, axis: ForceAxis) -> f64 {
    match sample {
        RawSample::Pressure(v) => v,
        RawSample::SixAxis(v) => v[axis as usize],
    }
}

/// Streams scalar or vector force/pressure and answers stability queries
/// over the buffered history. The raw sample is retained in full, so any
/// axis of a six-axis reading can still be queried after buffering
/// (spec §4.2) — only the default query axis (Z) is privileged.
pub struct ForceSource<T: ForceTransport> {
    transport: T,
    buffer: HeapRb<RawSample>,
    last_published: Option<f64>,
    has_sample: bool,
    tolerance: f64,
}

impl<T: ForceTransport> ForceSource<T> {
    pub fn new_force(transport: T) -> Self {
        ForceSource {
            transport,
            buffer: HeapRb::new(BUFFER_CAPACITY),
            last_published: None,
            has_sample: false,
            tolerance: DEFAULT_FORCE_TOLERANCE_N,
        }
    }

    pub fn new_pressure(transport: T) -> Self {
        ForceSource {
            transport,
            buffer: HeapRb::new(BUFFER_CAPACITY),
            last_published: None,
            has_sample: false,
            tolerance: DEFAULT_PRESSURE_TOLERANCE_KPA,
        }
    }

    /// Pulls any pending samples into the ring buffer, unreduced.
    pub fn update_buffer(&mut self) {
        for sample in self.transport.poll() {
            self.buffer.push_overwrite(sample);
            self.has_sample = true;
        }
    }

    /// Most recent buffered sample projected onto `axis`, or the Z-force
    /// component when `axis` is `None` — the axis the controller's
    /// force-PID loop couples to (spec §4.3). `None` overall if nothing
    /// has arrived yet.
    pub fn latest(&self, axis: Option<ForceAxis>) -> Option<f64> {
        let axis = axis.unwrap_or(ForceAxis::Fz);
        self.buffer.iter().last().map(|&s| project(s, axis))
    }

    /// True iff the rounded value differs from the last published value,
    /// deduplicating telemetry (spec §8 invariant 10). Updates internal
    /// dedup state as a side effect.
    pub fn force_changed(&mut self, value: f64) -> bool {
        let rounded = (value * 1000.0).round() / 1000.0;
        let changed = self.last_published != Some(rounded);
        self.last_published = Some(rounded);
        changed
    }

    pub fn is_force_near_setpoint(&self, setpoint: f64) -> bool {
        match self.latest(None) {
            Some(v) => (v - setpoint).abs() <= self.tolerance,
            None => false,
        }
    }

    fn mean_and_std(&self, axis: ForceAxis) -> Option<(f64, f64)> {
        let samples: Vec<f64> = self.buffer.iter().map(|&s| project(s, axis)).collect();
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some((mean, variance.sqrt()))
    }

    /// True when the buffer's standard deviation is under threshold and
    /// the mean is within tolerance of `setpoint + z_offset`.
    pub fn is_force_stable(&self, setpoint: f64, z_offset: f64) -> bool {
        match self.mean_and_std(ForceAxis::Fz) {
            Some((mean, std)) => {
                std < STABILITY_STD_DEV_THRESHOLD && (mean - (setpoint + z_offset)).abs() <= self.tolerance
            }
            None => false,
        }
    }

    /// Same stability test restricted to the Z-axis reading, used when the
    /// underlying transport is six-axis (spec §4.2).
    pub fn is_force_z_stable(&self, setpoint: f64, z_offset: f64) -> bool {
        self.is_force_stable(setpoint, z_offset)
    }

    pub fn ready(&self) -> bool {
        self.has_sample
    }
}

/// Object-safe view over [`ForceSource`], so the controller can hold one
/// behind a `Box<dyn DynForceSource>` regardless of its transport type.
pub trait DynForceSource: Send {
    fn update_buffer(&mut self);
    fn latest(&self, axis: Option<ForceAxis>) -> Option<f64>;
    fn force_changed(&mut self, value: f64) -> bool;
    fn is_force_near_setpoint(&self, setpoint: f64) -> bool;
    fn is_force_stable(&self, setpoint: f64, z_offset: f64) -> bool;
    fn is_force_z_stable(&self, setpoint: f64, z_offset: f64) -> bool;
    fn ready(&self) -> bool;
}

impl<T: ForceTransport + Send> DynForceSource for ForceSource<T> {
    fn update_buffer(&mut self) {
        ForceSource::update_buffer(self)
    }

    fn latest(&self, axis: Option<ForceAxis>) -> Option<f64> {
        ForceSource::latest(self, axis)
    }

    fn force_changed(&mut self, value: f64) -> bool {
        ForceSource::force_changed(self, value)
    }

    fn is_force_near_setpoint(&self, setpoint: f64) -> bool {
        ForceSource::is_force_near_setpoint(self, setpoint)
    }

    fn is_force_stable(&self, setpoint: f64, z_offset: f64) -> bool {
        ForceSource::is_force_stable(self, setpoint, z_offset)
    }

    fn is_force_z_stable(&self, setpoint: f64, z_offset: f64) -> bool {
        ForceSource::is_force_z_stable(self, setpoint, z_offset)
    }

    fn ready(&self) -> bool {
        ForceSource::ready(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTransport {
        queued: Vec<RawSample>,
    }

    impl ForceTransport for FixedTransport {
        fn poll(&mut self) -> Vec<RawSample> {
            std::mem::take(&mut self.queued)
        }
    }

    #[test]
    fn test_ready_false_until_first_sample() {
        let mut source = ForceSource::new_force(FixedTransport { queued: vec![] });
        assert!(!source.ready());
        source.transport.queued.push(RawSample::Pressure(1.0));
        source.update_buffer();
        assert!(source.ready());
    }

    #[test]
    fn test_force_changed_dedup() {
        let mut source = ForceSource::new_force(FixedTransport { queued: vec![] });
        assert!(source.force_changed(1.2345));
        assert!(!source.force_changed(1.2346)); // rounds to same 3 d.p.
        assert!(source.force_changed(2.0));
    }

    #[test]
    fn test_is_force_near_setpoint() {
        let mut source = ForceSource::new_force(FixedTransport {
            queued: vec![RawSample::Pressure(5.1)],
        });
        source.update_buffer();
        assert!(source.is_force_near_setpoint(5.0));
        assert!(!source.is_force_near_setpoint(10.0));
    }

    #[test]
    fn test_is_force_stable_requires_low_variance() {
        let samples = vec![
            RawSample::Pressure(5.0),
            RawSample::Pressure(5.01),
            RawSample::Pressure(4.99),
        ];
        let mut source = ForceSource::new_force(FixedTransport { queued: samples });
        source.update_buffer();
        assert!(source.is_force_stable(5.0, 0.0));
    }

    #[test]
    fn test_latest_queries_non_z_axis_of_six_axis_sample() {
        let mut source = ForceSource::new_force(FixedTransport {
            queued: vec![RawSample::SixAxis([1.0, 2.0, 3.0, 4.0, 5.0, 6.0])],
        });
        source.update_buffer();
        assert_eq!(source.latest(None), Some(3.0)); // defaults to Fz
        assert_eq!(source.latest(Some(ForceAxis::Fx)), Some(1.0));
        assert_eq!(source.latest(Some(ForceAxis::Ty)), Some(5.0));
    }
}
