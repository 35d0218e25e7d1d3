use shoelink_peer::Coordinator;

use crate::cmd::disconnect;
use crate::exit::{group_error, CliResult, PARTIAL_FAILURE, SUCCESS};
use crate::output::{print_status, OutputFormat};

pub async fn run(coordinator: Coordinator, format: OutputFormat) -> CliResult<i32> {
    let connected = coordinator.connect_all().await;
    let snapshot = coordinator.status();
    disconnect(&coordinator).await;

    print_status(&snapshot, format);
    match connected {
        Ok(_) => Ok(SUCCESS),
        Err(_) if snapshot.values().any(|status| status.is_connected()) => Ok(PARTIAL_FAILURE),
        Err(err) => Err(group_error("no device reachable", err)),
    }
}
