use shoelink_peer::Coordinator;

use crate::cmd::{broadcast, ModeArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub async fn run(coordinator: Coordinator, args: ModeArgs, format: OutputFormat) -> CliResult<i32> {
    broadcast(&coordinator, "mode", format, |c| c.set_mode_all(args.mode)).await
}
