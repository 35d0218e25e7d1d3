//! Dual-shoe walkthrough against in-process devices.
//!
//! Run with:
//!   cargo run --example dual-shoe
//!
//! Both shoes are `MemoryTransport`s, so no hardware is needed. The right
//! shoe drops out halfway through to show that the left keeps working.

use std::sync::Arc;

use shoelink::peer::{ChannelConfig, Coordinator, Event, EventKind, Mode};
use shoelink::transport::MemoryTransport;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let left = MemoryTransport::new("Neely-L");
    let right = MemoryTransport::new("Neely-R");
    let coordinator = Coordinator::dual(
        Arc::new(left.clone()),
        Arc::new(right.clone()),
        ChannelConfig::default(),
    );

    for kind in EventKind::ALL {
        coordinator.events().subscribe(kind, |event: &Event| {
            eprintln!("event: {}", describe(event));
            Ok(())
        });
    }
    let mut messages = coordinator.messages();

    coordinator.connect_all().await?;
    coordinator.set_mode_all(Mode::Midi).await?;

    left.device().push(b"step:heel\nstep:");
    left.device().push(b"toe\n");
    right.device().push(b"step:heel\n");
    for _ in 0..3 {
        if let Some(message) = messages.recv().await {
            println!("[{}] {}", message.channel(), message.text());
        }
    }

    right.device().drop_link("battery low");
    tokio::task::yield_now().await;

    let report = coordinator.set_mode_all(Mode::Hid).await?;
    for (channel, outcome) in report.iter() {
        let label = if outcome.is_ok() { "ok" } else { "skipped" };
        println!("mode:hid on {channel}: {label}");
    }

    println!("left wrote: {:?}", left.device().written_text());
    println!("right wrote: {:?}", right.device().written_text());

    coordinator.disconnect_all().await?;
    Ok(())
}

fn describe(event: &Event) -> String {
    match event.message() {
        Some(message) => format!("{} {} {:?}", event.channel, event.kind(), message.text()),
        None => format!("{} {}", event.channel, event.kind()),
    }
}
