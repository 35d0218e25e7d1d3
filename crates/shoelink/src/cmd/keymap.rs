use shoelink_peer::{Command, Coordinator};

use crate::cmd::{broadcast, KeymapArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub async fn run(
    coordinator: Coordinator,
    args: KeymapArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let command = Command::set_keymap(args.index, args.key_code);
    broadcast(&coordinator, "keymap", format, |c| c.send_command_all(&command)).await
}
