//! Fake shoe on a Unix socket, for trying the CLI without hardware.
//!
//! Run with:
//!   cargo run --example fake-shoe
//!
//! In another terminal:
//!   cargo run --features cli -- --device unix:/tmp/shoelink-fake-shoe.sock monitor
//!   cargo run --features cli -- --device unix:/tmp/shoelink-fake-shoe.sock mode hid

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;
    use std::time::Duration;

    let sock_path = std::env::temp_dir().join("shoelink-fake-shoe.sock");
    let _ = std::fs::remove_file(&sock_path);
    let listener = UnixListener::bind(&sock_path)?;
    eprintln!("Fake shoe listening on {}", sock_path.display());

    for stream in listener.incoming() {
        let mut stream = stream?;
        eprintln!("Host connected");

        let mut writer = stream.try_clone()?;
        std::thread::spawn(move || {
            for step in 1.. {
                if writer.write_all(format!("step:{step}\n").as_bytes()).is_err() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(500));
            }
        });

        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => eprintln!("Received: {:?}", String::from_utf8_lossy(&buf[..n])),
            }
        }
        eprintln!("Host disconnected");
    }
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("fake-shoe needs Unix domain sockets");
}
