use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    incoming_channel, DiscoveryFilter, Incoming, IncomingSender, Link, LinkEvent, Transport,
};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Unix domain socket device binding.
///
/// Connects to a socket served by a firmware emulator or by a bridge that
/// exposes a device's UART. Each `open` yields a fresh connection.
#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    path: PathBuf,
}

impl UnixSocketTransport {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The socket path this transport connects to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Transport for UnixSocketTransport {
    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }

    async fn open(&self, filter: Option<&DiscoveryFilter>) -> Result<Box<dyn Link>> {
        if let Some(prefix) = filter.and_then(|f| f.name_prefix.as_deref()) {
            // The socket file name stands in for the advertised device name.
            let name = self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !name.starts_with(prefix) {
                return Err(TransportError::NotAvailable(format!(
                    "{} does not match name prefix {prefix}",
                    self.path.display()
                )));
            }
        }

        let path_bytes = self.path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::Open {
                target: self.path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "socket path too long ({path_bytes} bytes, max {})",
                        Self::MAX_PATH_LEN
                    ),
                ),
            });
        }

        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TransportError::NotAvailable(format!("no device socket at {}", self.path.display()))
            } else {
                TransportError::Open {
                    target: self.path.clone(),
                    source: e,
                }
            }
        })?;
        info!(path = ?self.path, "connected to device socket");

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = incoming_channel();
        let linked = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(pump(read_half, tx, Arc::clone(&linked)));

        Ok(Box::new(UnixSocketLink {
            writer: Mutex::new(Some(write_half)),
            incoming: Some(rx),
            linked,
            reader,
        }))
    }
}

async fn pump(mut read_half: OwnedReadHalf, tx: IncomingSender, linked: Arc<AtomicBool>) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let reason = loop {
        match read_half.read(&mut buf).await {
            Ok(0) => break Some("peer closed the socket".to_string()),
            Ok(n) => {
                if tx.send(LinkEvent::Chunk(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    // Subscriber went away; keep the link but stop reading.
                    return;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => break Some(err.to_string()),
        }
    };
    linked.store(false, Ordering::SeqCst);
    debug!(?reason, "device socket reader finished");
    let _ = tx.send(LinkEvent::Dropped { reason });
}

struct UnixSocketLink {
    writer: Mutex<Option<OwnedWriteHalf>>,
    incoming: Option<Incoming>,
    linked: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl Link for UnixSocketLink {
    fn subscribe(&mut self) -> Option<Incoming> {
        self.incoming.take()
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.linked.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.linked.store(false, Ordering::SeqCst);
        self.reader.abort();
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(err) = writer.shutdown().await {
                warn!(error = %err, "device socket shutdown failed");
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn is_linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }
}

impl Drop for UnixSocketLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
