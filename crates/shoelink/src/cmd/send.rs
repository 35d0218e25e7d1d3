use shoelink_peer::Coordinator;

use crate::cmd::{broadcast, SendArgs};
use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub async fn run(coordinator: Coordinator, args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.text.trim().is_empty() {
        return Err(CliError::new(USAGE, "command text must not be empty"));
    }
    broadcast(&coordinator, "send", format, |c| c.send_all(&args.text)).await
}
