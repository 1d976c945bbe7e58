//! Sniff proxy lifecycle orchestration.
//!
//! Starting the proxy is pre-flight checked and non-blocking: the port is
//! probed first (an occupied port is terminal for the attempt and surfaced
//! to the user), then the listener is bound and the accept loop is spawned
//! onto its own task. The returned [`ProxyHandle`] is the single owner of
//! the running service; other components only ever see its port.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::error::ProxyError;
use super::server::{NewTaskEvent, SniffProxyServer, SniffServerConfig, TaskSniffer};
use crate::ports::{self, PortPlan};

/// Owner of the running sniff proxy service.
///
/// Held by the application for the process lifetime. Dropping the handle
/// does not stop the service; [`shutdown`] does, with process exit as the
/// fallback teardown.
///
/// [`shutdown`]: ProxyHandle::shutdown
#[derive(Debug)]
pub struct ProxyHandle {
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProxyHandle {
    /// Port the proxy is listening on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signal the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the accept loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the sniff proxy for `plan.proxy_port`.
///
/// Pre-flight probes the port: when occupied, returns
/// [`ProxyError::PortInUse`] without attempting to start; the caller
/// surfaces it and continues in degraded mode. Otherwise binds the
/// listener, spawns the accept loop, and returns as soon as the listener
/// is bound; the call never waits on the accept loop itself.
///
/// Every download-worthy transaction the proxy observes is posted on
/// `events_tx`; delivery into UI-facing code must go through that channel.
pub async fn start(
    plan: &PortPlan,
    sniffer: Arc<dyn TaskSniffer>,
    events_tx: mpsc::Sender<NewTaskEvent>,
) -> Result<ProxyHandle, ProxyError> {
    let port = plan.proxy_port;
    if ports::port_in_use(port) {
        return Err(ProxyError::PortInUse { port });
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ProxyError::Bind { addr, source })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = SniffProxyServer::new(SniffServerConfig { sniffer, events_tx }, shutdown_rx);

    let task = tokio::spawn(async move {
        if let Err(e) = server.run(listener).await {
            error!("Sniff proxy server error: {}", e);
        }
    });

    info!("Sniff proxy listening on {}", addr);

    Ok(ProxyHandle {
        port,
        shutdown_tx,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdTcpListener;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::{timeout, Duration};

    struct FixedSniffer(&'static str);

    impl TaskSniffer for FixedSniffer {
        fn sniff(&self, _head: &[u8]) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn free_port() -> u16 {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn plan(proxy_port: u16) -> PortPlan {
        PortPlan {
            proxy_port,
            control_port: 8080,
            view_port: 8080,
        }
    }

    #[tokio::test]
    async fn occupied_port_is_terminal_and_nothing_listens() {
        let guard = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let port = guard.local_addr().unwrap().port();
        let (events_tx, _events_rx) = mpsc::channel(8);

        let err = start(&plan(port), Arc::new(FixedSniffer("t")), events_tx)
            .await
            .expect_err("occupied port must not start");

        assert!(matches!(err, ProxyError::PortInUse { port: p } if p == port));

        // Only the pre-existing process still owns the port.
        drop(guard);
        assert!(!ports::port_in_use(port));
    }

    #[tokio::test]
    async fn started_proxy_accepts_connections_and_posts_events() {
        let port = free_port();
        let (events_tx, mut events_rx) = mpsc::channel(8);

        let handle = start(&plan(port), Arc::new(FixedSniffer("abc123")), events_tx)
            .await
            .expect("free port should start");
        assert_eq!(handle.port(), port);

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"GET /x.zip HTTP/1.1\r\n\r\n").await.unwrap();

        let event = timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("event should arrive promptly")
            .expect("sender should be alive");
        assert_eq!(event.task_id, "abc123");

        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_the_accept_loop() {
        let port = free_port();
        let (events_tx, _events_rx) = mpsc::channel(8);

        let handle = start(&plan(port), Arc::new(FixedSniffer("t")), events_tx)
            .await
            .unwrap();

        handle.shutdown();
        timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("accept loop should exit after shutdown");

        assert!(!ports::port_in_use(port));
    }
}
