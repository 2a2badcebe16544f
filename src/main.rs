//! CLI bootstrap binary: loads configuration, wires up the driver and
//! movement algorithm it selects, and drives the controller's tick loop at
//! the 30 Hz cadence of spec §5.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};

use tms_robot_control::config::{MovementAlgorithm as MovementAlgorithmKind, RobotKind, Settings};
use tms_robot_control::controller::Controller;
use tms_robot_control::movement::{DirectlyPid, DirectlyUpward, MovementAlgorithm, RadiallyOutward};
use tms_robot_control::pid::{PidGains, PidGroup};
use tms_robot_control::remote::{NullSink, RemoteControlSink, TempFileSink};
use tms_robot_control::robot_driver::{RobotDriver, TestRobotDriver};

const TICK_RATE_HZ: f64 = 30.0;

/// TMS robotic positioning control core.
#[derive(Parser, Debug)]
#[command(name = "tms-robot-control", version, about)]
struct Cli {
    /// Path to a TOML file overriding the bundled defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides the robot connection target (meaning is driver-specific).
    #[arg(long, value_name = "IP")]
    robot_ip: Option<String>,

    /// Disables the debug-visualisation temp-file sink.
    #[arg(long)]
    no_debug_sink: bool,
}

fn build_driver(kind: RobotKind, speed_mm_per_sec: f64) -> anyhow::Result<Box<dyn RobotDriver>> {
    match kind {
        RobotKind::Test => Ok(Box::new(TestRobotDriver::new(speed_mm_per_sec))),
        RobotKind::Elfin | RobotKind::Dobot => {
            anyhow::bail!("vendor robot transports are out of scope for this core; use robot = \"test\"")
        }
    }
}

fn build_movement_algorithm(kind: MovementAlgorithmKind, settings: &Settings) -> Box<dyn MovementAlgorithm> {
    match kind {
        MovementAlgorithmKind::RadiallyOutward => Box::new(RadiallyOutward::new(15.0, settings.safe_height)),
        MovementAlgorithmKind::DirectlyUpward => Box::new(DirectlyUpward::new(settings.safe_height)),
        MovementAlgorithmKind::DirectlyPid => {
            let pid = PidGroup::new(PidGains::default(), 100.0, 50.0, settings.use_force_sensor, 0.0);
            Box::new(DirectlyPid::new(pid, 1.0 / TICK_RATE_HZ))
        }
    }
}

fn build_sink(disabled: bool) -> anyhow::Result<Box<dyn RemoteControlSink>> {
    if disabled {
        Ok(Box::new(NullSink))
    } else {
        Ok(Box::new(TempFileSink::new()?))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    let level = if settings.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let algorithm_kind = settings.movement_algorithm_kind()?;
    info!("starting control core; robot={:?}, algorithm={:?}", settings.robot_kind()?, algorithm_kind);

    let driver = build_driver(settings.robot_kind()?, settings.robot_speed)?;
    let movement_algorithm = build_movement_algorithm(algorithm_kind, &settings);
    let sink = build_sink(cli.no_debug_sink)?;

    let mut controller = Controller::new(settings, driver, movement_algorithm, None, sink);

    if let Some(ip) = cli.robot_ip {
        info!("robot IP override requested: {ip} (forwarded to the vendor driver, not used by the core)");
    }

    let tick_duration = Duration::from_secs_f64(1.0 / TICK_RATE_HZ);
    loop {
        let tick_start = Instant::now();
        if !controller.update() {
            error!("unable to connect to the robot driver; stopping");
            anyhow::bail!("robot driver unreachable");
        }
        let elapsed = tick_start.elapsed();
        if let Some(remaining) = tick_duration.checked_sub(elapsed) {
            std::thread::sleep(remaining);
        }
    }
}
