//! Sniff proxy server: accept loop and the sniff-engine seam.
//!
//! The server owns the TCP accept loop on the proxy port and hands the
//! opening bytes of every intercepted exchange to a [`TaskSniffer`], which
//! decides whether the exchange is a download-worthy transaction. Protocol
//! handling past that seam (TLS interception, rewriting) belongs to the
//! interception engine, not to this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::ProxyError;

/// A download-worthy transaction observed by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskEvent {
    /// Identifier of the sniffed task, forwarded into the UI surface.
    pub task_id: String,
}

/// Decides whether an intercepted exchange is a download-worthy transaction.
///
/// Runs on the proxy's own tasks; implementations must not touch UI state.
pub trait TaskSniffer: Send + Sync {
    /// Inspect the opening bytes of an exchange. Returns the task id when
    /// the exchange should surface as a new download task.
    fn sniff(&self, head: &[u8]) -> Option<String>;
}

/// Request-line sniffer flagging downloads by target extension.
///
/// Looks at the first line of a plain HTTP request and emits a task when
/// the target path ends in a known download extension. Task ids carry a
/// process-unique sequence number plus the file name.
pub struct ExtensionSniffer {
    extensions: Vec<&'static str>,
    seq: AtomicU64,
}

/// Target extensions treated as download-worthy by default.
const DOWNLOAD_EXTENSIONS: [&str; 13] = [
    "zip", "rar", "7z", "tar", "gz", "iso", "exe", "msi", "dmg", "apk", "mp4", "mkv", "pdf",
];

impl ExtensionSniffer {
    /// Create a sniffer with the default extension set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extensions: DOWNLOAD_EXTENSIONS.to_vec(),
            seq: AtomicU64::new(0),
        }
    }
}

impl Default for ExtensionSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSniffer for ExtensionSniffer {
    fn sniff(&self, head: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(head).ok()?;
        let request_line = text.lines().next()?;

        // "GET /path/file.zip HTTP/1.1"
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        if method != "GET" {
            return None;
        }

        let path = target
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or(target);
        let name = path.rsplit('/').next().unwrap_or(path);
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        if name.contains('.') && self.extensions.contains(&ext.as_str()) {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            Some(format!("{seq}-{name}"))
        } else {
            None
        }
    }
}

/// Configuration for the sniff proxy server.
pub struct SniffServerConfig {
    /// The sniff-engine seam.
    pub sniffer: Arc<dyn TaskSniffer>,
    /// Channel new-task events are posted on.
    pub events_tx: mpsc::Sender<NewTaskEvent>,
}

/// The sniff proxy server.
///
/// Accepts connections until the shutdown signal flips; each connection is
/// handled on its own task.
pub struct SniffProxyServer {
    config: SniffServerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl SniffProxyServer {
    /// Create a server from an already-bound listener's configuration.
    pub fn new(config: SniffServerConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            config,
            shutdown_rx,
        }
    }

    /// Run the accept loop on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<(), ProxyError> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.spawn_connection_handler(stream);
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Sniff proxy shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Spawn a task to handle a single intercepted connection.
    fn spawn_connection_handler(&self, stream: TcpStream) {
        let sniffer = self.config.sniffer.clone();
        let events_tx = self.config.events_tx.clone();

        tokio::spawn(async move {
            handle_connection(stream, sniffer, events_tx).await;
        });
    }
}

/// Read the opening bytes of the exchange and run the sniff seam over them.
///
/// The stream is released afterwards; relaying the exchange onward is the
/// interception engine's job, outside this crate.
async fn handle_connection(
    mut stream: TcpStream,
    sniffer: Arc<dyn TaskSniffer>,
    events_tx: mpsc::Sender<NewTaskEvent>,
) {
    let mut head = [0u8; 4096];
    match stream.read(&mut head).await {
        Ok(0) => {}
        Ok(n) => {
            if let Some(task_id) = sniffer.sniff(&head[..n]) {
                debug!("Sniffed download-worthy transaction: {}", task_id);
                if events_tx.send(NewTaskEvent { task_id }).await.is_err() {
                    debug!("New-task receiver dropped, discarding event");
                }
            }
        }
        Err(e) => {
            debug!("Connection read error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffer_flags_download_targets() {
        let sniffer = ExtensionSniffer::new();
        let id = sniffer
            .sniff(b"GET /files/movie.mkv HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .expect("mkv target should be sniffed");
        assert!(id.ends_with("movie.mkv"));
    }

    #[test]
    fn sniffer_strips_query_strings() {
        let sniffer = ExtensionSniffer::new();
        let id = sniffer
            .sniff(b"GET /dl/tool.zip?token=abc HTTP/1.1\r\n\r\n")
            .expect("query string should not hide the extension");
        assert!(id.ends_with("tool.zip"));
    }

    #[test]
    fn sniffer_ignores_page_loads() {
        let sniffer = ExtensionSniffer::new();
        assert!(sniffer.sniff(b"GET /index.html HTTP/1.1\r\n\r\n").is_none());
        assert!(sniffer.sniff(b"GET / HTTP/1.1\r\n\r\n").is_none());
        assert!(sniffer.sniff(b"POST /upload.zip HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn sniffer_ignores_non_http_bytes() {
        let sniffer = ExtensionSniffer::new();
        assert!(sniffer.sniff(&[0x16, 0x03, 0x01, 0x02, 0x00]).is_none());
    }

    #[test]
    fn task_ids_are_unique_per_sniff() {
        let sniffer = ExtensionSniffer::new();
        let a = sniffer.sniff(b"GET /a.zip HTTP/1.1\r\n\r\n").unwrap();
        let b = sniffer.sniff(b"GET /a.zip HTTP/1.1\r\n\r\n").unwrap();
        assert_ne!(a, b);
    }
}
