use shoelink_peer::{Coordinator, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cmd::{connect, disconnect, MonitorArgs};
use crate::exit::{CliError, CliResult, LINK_ERROR, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(
    coordinator: Coordinator,
    args: MonitorArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    // Subscribe before connecting so nothing sent right after the link comes
    // up is missed.
    let mut messages = coordinator.messages();
    let (drop_tx, mut drops) = mpsc::unbounded_channel();
    let drop_subscription = coordinator
        .events()
        .subscribe(EventKind::Disconnected, move |event| {
            let _ = drop_tx.send(event.channel.clone());
            Ok(())
        });

    connect(&coordinator).await?;
    info!(channels = ?coordinator.channel_names(), "monitoring; press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    let outcome = loop {
        if args.count.is_some_and(|count| printed >= count) {
            break Ok(SUCCESS);
        }
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("interrupted");
                break Ok(SUCCESS);
            }
            message = messages.recv() => match message {
                Some(message) => {
                    print_message(&message, format);
                    printed = printed.saturating_add(1);
                }
                None => break Ok(SUCCESS),
            },
            Some(channel) = drops.recv() => {
                info!(channel = %channel, "device disconnected");
                if !coordinator.is_any_connected() {
                    break Err(CliError::new(LINK_ERROR, "all devices disconnected"));
                }
            }
        }
    };

    coordinator.events().unsubscribe(drop_subscription);
    disconnect(&coordinator).await;
    outcome
}
