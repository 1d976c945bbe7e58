//! Application startup sequence and UI command loop.
//!
//! Startup runs sequentially on the calling thread: load configuration,
//! resolve ports, attempt the proxy start (an occupied proxy port degrades
//! to a running app without interception), fire the best-effort trust
//! check, seed the routing machine and re-apply its persisted mode, then
//! enter the UI command loop.
//!
//! The command loop is the single place surface state is touched. Tray
//! actions and proxy events are posted onto the command channel from their
//! own threads; nothing mutates the surface from anywhere else.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::config::ConfigLoader;
use crate::notify::{LogNotifier, Notifier};
use crate::ports;
use crate::proxy::{self, ExtensionSniffer, ProxyError, TaskSniffer};
use crate::routing::{self, RoutingMode, RoutingModeMachine};
use crate::surface::{self, SurfaceController};
use crate::trust;

/// Buffer size for the UI command channel.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Buffer size for the proxy event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Actions exposed to the tray/menu layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    /// Show the application surface.
    Open,
    /// Open the certificate download page in the system browser.
    DownloadCert,
    /// Switch to the given routing mode.
    SelectMode(RoutingMode),
    /// About entry; reveals the surface like Open.
    About,
    /// Exit the application.
    Quit,
}

/// Commands processed by the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Reveal the surface.
    Open,
    /// Hide the surface.
    Close,
    /// A download-worthy transaction was sniffed.
    NewTask {
        /// Identifier to forward into the surface.
        task_id: String,
    },
    /// Switch the routing mode.
    SelectMode(RoutingMode),
    /// Open the certificate download page.
    DownloadCert,
    /// Leave the command loop and tear down.
    Quit,
}

/// Handle given to the tray/menu layer.
///
/// Cheap to clone; safe to use from any thread. Everything it does is
/// posted onto the UI command channel.
#[derive(Debug, Clone)]
pub struct AppHandle {
    tx: mpsc::Sender<UiCommand>,
}

impl AppHandle {
    /// Translate a tray action into a UI command and post it.
    pub fn dispatch(&self, action: TrayAction) {
        let command = match action {
            TrayAction::Open | TrayAction::About => UiCommand::Open,
            TrayAction::DownloadCert => UiCommand::DownloadCert,
            TrayAction::SelectMode(mode) => UiCommand::SelectMode(mode),
            TrayAction::Quit => UiCommand::Quit,
        };
        if self.tx.try_send(command).is_err() {
            warn!("UI command channel unavailable, dropping {:?}", action);
        }
    }

    /// Reveal the application surface.
    pub fn open(&self) {
        self.dispatch(TrayAction::Open);
    }

    /// Hide the application surface.
    pub fn close(&self) {
        if self.tx.try_send(UiCommand::Close).is_err() {
            warn!("UI command channel unavailable, dropping close");
        }
    }

    /// Switch the routing mode.
    pub fn select_mode(&self, mode: RoutingMode) {
        self.dispatch(TrayAction::SelectMode(mode));
    }
}

/// Run the application until the user quits.
pub fn run(cli: &Cli) -> Result<()> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("Failed to load configuration")?;

    let plan =
        ports::resolve_ports(&loader, &mut config).context("Failed to resolve listening ports")?;
    info!(
        "Resolved ports: proxy={}, control={}, view={}",
        plan.proxy_port, plan.control_port, plan.view_port
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let (ui_tx, mut ui_rx) = mpsc::channel::<UiCommand>(COMMAND_CHANNEL_SIZE);
    let tray = AppHandle { tx: ui_tx.clone() };

    // Start the sniff proxy. An occupied port is terminal for this attempt
    // only: the user is told and the rest of the app keeps working.
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let sniffer: Arc<dyn TaskSniffer> = Arc::new(ExtensionSniffer::new());
    let proxy_handle = match rt.block_on(proxy::start(&plan, sniffer, events_tx)) {
        Ok(handle) => Some(handle),
        Err(ProxyError::PortInUse { port }) => {
            notifier.alert(&format!(
                "Port {port} is taken by another program. Close it or configure a different proxy port."
            ));
            None
        }
        Err(e) => return Err(e).context("Failed to start the sniff proxy"),
    };

    // Best-effort trust certificate check; failures only log.
    let cert_path = loader.resource_path("ca.crt");
    rt.spawn_blocking(move || trust::ensure_trust_certificate(&cert_path));

    // Seed the routing machine from the persisted mode and re-apply its OS
    // effect; the OS state is not trusted to have survived the last exit.
    let mut machine = RoutingModeMachine::new(
        routing::platform_system_proxy(),
        loader.clone(),
        config,
        plan,
    );
    if let Err(e) = machine.apply_current() {
        warn!("Could not re-apply persisted routing mode: {}", e);
        notifier.toast(&format!("Could not apply {} routing", machine.current()));
    }
    debug!("Mode selector: {:?}", machine.menu_items());

    // Proxy events cross into the UI loop through the command channel only.
    let forward_tx = ui_tx.clone();
    rt.spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let command = UiCommand::NewTask {
                task_id: event.task_id,
            };
            if forward_tx.send(command).await.is_err() {
                break;
            }
        }
    });

    // Ctrl-C goes through the same quit path as the tray menu.
    let signal_tray = tray.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_tray.dispatch(TrayAction::Quit);
        }
    });

    let view_url = format!("http://127.0.0.1:{}", plan.view_port);
    let mut surfaces = SurfaceController::new(None, view_url, !cli.headless);

    notifier.toast("proxydown started");
    if !cli.headless {
        tray.open();
    }

    // UI command loop. The surface has single-threaded affinity to this
    // thread; the loop runs until Quit.
    while let Some(command) = ui_rx.blocking_recv() {
        match command {
            UiCommand::Open => surfaces.open(),
            UiCommand::Close => surfaces.close(),
            UiCommand::NewTask { task_id } => surfaces.handle_new_task(&task_id),
            UiCommand::SelectMode(mode) => {
                if let Err(e) = machine.select(mode) {
                    warn!("Routing mode switch failed: {}", e);
                    notifier.toast("Sniff mode switch failed");
                }
            }
            UiCommand::DownloadCert => {
                surface::open_in_browser(&format!("http://127.0.0.1:{}", plan.proxy_port));
            }
            UiCommand::Quit => break,
        }
    }

    // Teardown: clear the OS route (the persisted mode survives and is
    // re-applied on the next start) and stop the accept loop.
    machine.clear_os_route();
    if let Some(handle) = &proxy_handle {
        handle.shutdown();
    }
    info!("proxydown shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (AppHandle, mpsc::Receiver<UiCommand>) {
        let (tx, rx) = mpsc::channel(8);
        (AppHandle { tx }, rx)
    }

    #[test]
    fn tray_actions_map_onto_ui_commands() {
        let (tray, mut rx) = handle();

        tray.dispatch(TrayAction::Open);
        tray.dispatch(TrayAction::About);
        tray.dispatch(TrayAction::DownloadCert);
        tray.dispatch(TrayAction::SelectMode(RoutingMode::GlobalRoute));
        tray.dispatch(TrayAction::Quit);

        assert_eq!(rx.try_recv().unwrap(), UiCommand::Open);
        // About reveals the surface, same as Open.
        assert_eq!(rx.try_recv().unwrap(), UiCommand::Open);
        assert_eq!(rx.try_recv().unwrap(), UiCommand::DownloadCert);
        assert_eq!(
            rx.try_recv().unwrap(),
            UiCommand::SelectMode(RoutingMode::GlobalRoute)
        );
        assert_eq!(rx.try_recv().unwrap(), UiCommand::Quit);
    }

    #[test]
    fn open_and_close_post_surface_commands() {
        let (tray, mut rx) = handle();

        tray.open();
        tray.close();
        tray.select_mode(RoutingMode::Disabled);

        assert_eq!(rx.try_recv().unwrap(), UiCommand::Open);
        assert_eq!(rx.try_recv().unwrap(), UiCommand::Close);
        assert_eq!(
            rx.try_recv().unwrap(),
            UiCommand::SelectMode(RoutingMode::Disabled)
        );
    }

    #[test]
    fn dropped_receiver_does_not_panic_the_dispatcher() {
        let (tray, rx) = handle();
        drop(rx);
        tray.dispatch(TrayAction::Open);
    }
}
