use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{
    incoming_channel, DiscoveryFilter, Incoming, IncomingSender, Link, LinkEvent, Transport,
};

/// Baud rate the shoe firmware runs its UART at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const READ_CHUNK_SIZE: usize = 4 * 1024;
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial line settings. Data bits, stop bits and parity are fixed at 8N1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub path: PathBuf,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl SerialSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Serial port device binding (USB CDC or UART adapter).
#[derive(Debug, Clone)]
pub struct SerialTransport {
    settings: SerialSettings,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

fn map_open_error(path: &Path, err: serialport::Error) -> TransportError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => {
            TransportError::NotAvailable(format!("{}: {}", path.display(), err.description))
        }
        serialport::ErrorKind::Io(IoErrorKind::NotFound) => {
            TransportError::NotAvailable(format!("no serial device at {}", path.display()))
        }
        serialport::ErrorKind::Io(kind) => TransportError::Open {
            target: path.to_path_buf(),
            source: std::io::Error::new(kind, err.description),
        },
        _ => TransportError::Open {
            target: path.to_path_buf(),
            source: std::io::Error::other(err.description),
        },
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn describe(&self) -> String {
        format!(
            "serial:{}@{}",
            self.settings.path.display(),
            self.settings.baud_rate
        )
    }

    async fn open(&self, filter: Option<&DiscoveryFilter>) -> Result<Box<dyn Link>> {
        if let Some(prefix) = filter.and_then(|f| f.name_prefix.as_deref()) {
            let name = self
                .settings
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !name.starts_with(prefix) {
                return Err(TransportError::NotAvailable(format!(
                    "{} does not match name prefix {prefix}",
                    self.settings.path.display()
                )));
            }
        }

        let settings = self.settings.clone();
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(settings.path.to_string_lossy(), settings.baud_rate)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .flow_control(FlowControl::None)
                .timeout(READ_POLL_TIMEOUT)
                .open()
                .map_err(|err| map_open_error(&settings.path, err))
        })
        .await
        .map_err(|err| TransportError::Link(format!("serial open task failed: {err}")))??;

        let reader_port = port
            .try_clone()
            .map_err(|err| map_open_error(&self.settings.path, err))?;
        info!(path = ?self.settings.path, baud = self.settings.baud_rate, "serial port open");

        let (tx, rx) = incoming_channel();
        let linked = Arc::new(AtomicBool::new(true));
        let reader_linked = Arc::clone(&linked);
        std::thread::Builder::new()
            .name("shoelink-serial-reader".to_string())
            .spawn(move || pump(reader_port, tx, reader_linked))
            .map_err(TransportError::Io)?;

        Ok(Box::new(SerialLink {
            port: Arc::new(Mutex::new(Some(port))),
            incoming: Some(rx),
            linked,
        }))
    }
}

fn pump(mut port: Box<dyn SerialPort>, tx: IncomingSender, linked: Arc<AtomicBool>) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let reason = loop {
        if !linked.load(Ordering::SeqCst) {
            // Closed from our side; no drop notification.
            return;
        }
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if tx.send(LinkEvent::Chunk(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    return;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    IoErrorKind::TimedOut | IoErrorKind::WouldBlock | IoErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => break err.to_string(),
        }
    };
    linked.store(false, Ordering::SeqCst);
    debug!(%reason, "serial reader finished");
    let _ = tx.send(LinkEvent::Dropped {
        reason: Some(reason),
    });
}

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

struct SerialLink {
    port: SharedPort,
    incoming: Option<Incoming>,
    linked: Arc<AtomicBool>,
}

#[async_trait]
impl Link for SerialLink {
    fn subscribe(&mut self) -> Option<Incoming> {
        self.incoming.take()
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.linked.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let port = Arc::clone(&self.port);
        let payload = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = port
                .lock()
                .map_err(|_| TransportError::Link("serial port lock poisoned".to_string()))?;
            let port = guard.as_mut().ok_or(TransportError::NotConnected)?;
            port.write_all(&payload)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|err| TransportError::Link(format!("serial write task failed: {err}")))?
    }

    async fn close(&self) -> Result<()> {
        self.linked.store(false, Ordering::SeqCst);
        let port = self
            .port
            .lock()
            .map_err(|_| TransportError::Link("serial port lock poisoned".to_string()))?
            .take();
        // Dropping the handle closes the port; the reader clone exits on its next poll.
        drop(port);
        Ok(())
    }

    fn is_linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }
}
