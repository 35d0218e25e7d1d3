use std::future::Future;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use shoelink_peer::{Coordinator, GroupReport, GroupResult, Mode};
use tracing::warn;

use crate::device::{build_coordinator, DeviceSpec};
use crate::exit::{group_error, io_error, CliResult, PARTIAL_FAILURE, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub mod keymap;
pub mod mode;
pub mod monitor;
pub mod send;
pub mod status;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a raw command line to every device.
    Send(SendArgs),
    /// Switch firmware output mode on every connected device.
    Mode(ModeArgs),
    /// Map a sensor index to a key code on every device.
    Keymap(KeymapArgs),
    /// Print incoming messages until interrupted.
    Monitor(MonitorArgs),
    /// Connect and report per-channel status.
    Status,
    /// Show version information.
    Version(VersionArgs),
}

/// Device selection, shared by every subcommand that talks to hardware.
#[derive(Args, Debug, Default, Clone)]
pub struct DeviceArgs {
    /// Single device: unix:PATH or serial:PATH[@BAUD].
    #[arg(
        long,
        value_name = "SPEC",
        env = "SHOELINK_DEVICE",
        global = true,
        conflicts_with_all = ["left", "right"]
    )]
    pub device: Option<DeviceSpec>,
    /// Left shoe device.
    #[arg(long, value_name = "SPEC", env = "SHOELINK_LEFT", global = true)]
    pub left: Option<DeviceSpec>,
    /// Right shoe device.
    #[arg(long, value_name = "SPEC", env = "SHOELINK_RIGHT", global = true)]
    pub right: Option<DeviceSpec>,
    /// Channel config file (JSON), applied to every device.
    #[arg(long, value_name = "FILE", env = "SHOELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Command text; trimmed before sending.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct ModeArgs {
    /// Output mode: midi or hid.
    pub mode: Mode,
}

#[derive(Args, Debug)]
pub struct KeymapArgs {
    /// Sensor index.
    pub index: u32,
    /// Key code to emit in HID mode.
    pub key_code: u32,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn run(command: Command, devices: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        Command::Send(args) => with_coordinator(&devices, |c| send::run(c, args, format)),
        Command::Mode(args) => with_coordinator(&devices, |c| mode::run(c, args, format)),
        Command::Keymap(args) => with_coordinator(&devices, |c| keymap::run(c, args, format)),
        Command::Monitor(args) => with_coordinator(&devices, |c| monitor::run(c, args, format)),
        Command::Status => with_coordinator(&devices, |c| status::run(c, format)),
    }
}

/// Run `op` on a current-thread runtime with the configured devices.
fn with_coordinator<F, Fut>(devices: &DeviceArgs, op: F) -> CliResult<i32>
where
    F: FnOnce(Coordinator) -> Fut,
    Fut: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(async {
        let coordinator = build_coordinator(devices)?;
        op(coordinator).await
    })
}

/// Connect every device. Returns whether all of them came up; fails only
/// when none did.
pub(crate) async fn connect(coordinator: &Coordinator) -> CliResult<bool> {
    match coordinator.connect_all().await {
        Ok(_) => Ok(true),
        Err(err) if coordinator.is_any_connected() => {
            for (channel, cause) in err.report.failed() {
                warn!(channel = %channel, error = %cause, "device unavailable; continuing without it");
            }
            Ok(false)
        }
        Err(err) => Err(group_error("connect failed", err)),
    }
}

pub(crate) async fn disconnect(coordinator: &Coordinator) {
    if let Err(err) = coordinator.disconnect_all().await {
        warn!(error = %err, "disconnect failed");
    }
}

/// Connect, run one group operation, disconnect and report.
pub(crate) async fn broadcast<Fut>(
    coordinator: &Coordinator,
    operation: &str,
    format: OutputFormat,
    op: impl FnOnce(&Coordinator) -> Fut,
) -> CliResult<i32>
where
    Fut: Future<Output = GroupResult>,
{
    let all_connected = connect(coordinator).await?;
    let outcome = op(coordinator).await;
    disconnect(coordinator).await;
    finish(operation, outcome, all_connected, format)
}

fn finish(
    operation: &str,
    outcome: GroupResult,
    all_connected: bool,
    format: OutputFormat,
) -> CliResult<i32> {
    match outcome {
        Ok(report) => {
            print_report(operation, &report, format);
            Ok(exit_code(&report, all_connected))
        }
        Err(err) => {
            print_report(operation, &err.report, format);
            Err(group_error(&format!("{operation} failed"), err))
        }
    }
}

fn exit_code(report: &GroupReport, all_connected: bool) -> i32 {
    if all_connected && report.all_succeeded() {
        SUCCESS
    } else {
        PARTIAL_FAILURE
    }
}
