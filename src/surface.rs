//! Single application surface management.
//!
//! The application guarantees at most one logical surface regardless of how
//! many "open" requests arrive: repeated opens restore and focus the
//! existing surface instead of creating duplicates, and closing hides it
//! without terminating the process (the proxy and tray presence keep
//! running).
//!
//! Rendering is an external collaborator behind the [`Surface`] trait; the
//! controller must only ever be driven from the thread that owns it.
//! Everything arriving from other threads (tray events, proxy callbacks)
//! crosses over through the application's command channel first.

use std::process::Command;

use tracing::{debug, warn};

/// One application window/view, as seen by the controller.
///
/// Implementations wrap whatever the embedder renders with. All calls
/// happen on the controller's thread.
pub trait Surface {
    /// Make the surface visible.
    fn show(&mut self);
    /// Hide the surface without destroying it.
    fn hide(&mut self);
    /// Whether the surface is currently visible.
    fn is_visible(&self) -> bool;
    /// Minimize the surface.
    fn minimize(&mut self);
    /// Restore the surface from its minimized state.
    fn restore(&mut self);
    /// Bring the surface to the foreground.
    fn focus(&mut self);
    /// Forward a sniffed task id into live surface content.
    ///
    /// Returns `false` when the surface cannot inject; the event is then
    /// dropped (no queue, no replay).
    fn inject_task(&mut self, task_id: &str) -> bool;
}

/// Factory creating the surface on first open.
pub type SurfaceFactory = Box<dyn Fn() -> Box<dyn Surface>>;

/// Guarantees a single surface instance across any number of open requests.
pub struct SurfaceController {
    factory: Option<SurfaceFactory>,
    surface: Option<Box<dyn Surface>>,
    view_url: String,
    browser_fallback: bool,
}

impl SurfaceController {
    /// Create a controller.
    ///
    /// Without a `factory`, `open()` falls back to launching the system
    /// browser at `view_url` (when `browser_fallback` is set) or does
    /// nothing beyond logging (headless operation).
    pub fn new(factory: Option<SurfaceFactory>, view_url: String, browser_fallback: bool) -> Self {
        Self {
            factory,
            surface: None,
            view_url,
            browser_fallback,
        }
    }

    /// Reveal the application surface.
    ///
    /// - no surface yet: create it and show it
    /// - surface visible: minimize-then-restore to force it to the
    ///   foreground, then focus (a plain focus call is not enough on every
    ///   platform)
    /// - surface hidden: show and focus
    pub fn open(&mut self) {
        let Some(factory) = &self.factory else {
            if self.browser_fallback {
                open_in_browser(&self.view_url);
            } else {
                debug!("No surface configured, ignoring open request");
            }
            return;
        };

        match &mut self.surface {
            None => {
                let mut surface = factory();
                surface.show();
                surface.focus();
                self.surface = Some(surface);
            }
            Some(surface) if surface.is_visible() => {
                surface.minimize();
                surface.restore();
                surface.focus();
            }
            Some(surface) => {
                surface.show();
                surface.focus();
            }
        }
    }

    /// Hide the surface. The process keeps running.
    pub fn close(&mut self) {
        if let Some(surface) = &mut self.surface {
            surface.hide();
        }
    }

    /// Deliver a sniffed task: reveal the surface and forward the task id.
    ///
    /// When the surface cannot inject (or none exists), the task id is
    /// dropped after the reveal.
    pub fn handle_new_task(&mut self, task_id: &str) {
        self.open();
        match &mut self.surface {
            Some(surface) => {
                if !surface.inject_task(task_id) {
                    debug!("Surface cannot inject, dropping task {}", task_id);
                }
            }
            None => {
                debug!("No surface to receive task {}", task_id);
            }
        }
    }

    /// Whether a surface instance currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.surface.is_some()
    }
}

/// Launch the system browser at `url`, best effort.
pub(crate) fn open_in_browser(url: &str) {
    #[cfg(target_os = "windows")]
    let result = Command::new("cmd").args(["/C", "start", "", url]).spawn();
    #[cfg(target_os = "macos")]
    let result = Command::new("open").arg(url).spawn();
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let result = Command::new("xdg-open").arg(url).spawn();

    match result {
        Ok(_) => debug!("Opened {} in system browser", url),
        Err(e) => warn!("Failed to open {} in system browser: {}", url, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct FakeState {
        created: usize,
        visible: bool,
        calls: Vec<&'static str>,
        injected: Vec<String>,
        injectable: bool,
    }

    struct FakeSurface(Arc<Mutex<FakeState>>);

    impl Surface for FakeSurface {
        fn show(&mut self) {
            let mut s = self.0.lock().unwrap();
            s.visible = true;
            s.calls.push("show");
        }

        fn hide(&mut self) {
            let mut s = self.0.lock().unwrap();
            s.visible = false;
            s.calls.push("hide");
        }

        fn is_visible(&self) -> bool {
            self.0.lock().unwrap().visible
        }

        fn minimize(&mut self) {
            self.0.lock().unwrap().calls.push("minimize");
        }

        fn restore(&mut self) {
            self.0.lock().unwrap().calls.push("restore");
        }

        fn focus(&mut self) {
            self.0.lock().unwrap().calls.push("focus");
        }

        fn inject_task(&mut self, task_id: &str) -> bool {
            let mut s = self.0.lock().unwrap();
            if s.injectable {
                s.injected.push(task_id.to_string());
                true
            } else {
                false
            }
        }
    }

    fn controller(injectable: bool) -> (Arc<Mutex<FakeState>>, SurfaceController) {
        let state = Arc::new(Mutex::new(FakeState {
            injectable,
            ..FakeState::default()
        }));
        let factory_state = state.clone();
        let factory: SurfaceFactory = Box::new(move || {
            let mut s = factory_state.lock().unwrap();
            s.created += 1;
            Box::new(FakeSurface(factory_state.clone()))
        });
        let ctl = SurfaceController::new(Some(factory), "http://127.0.0.1:8080".into(), true);
        (state, ctl)
    }

    #[test]
    fn open_creates_and_shows_a_surface_once() {
        let (state, mut ctl) = controller(true);

        ctl.open();
        ctl.close();
        ctl.open();

        let s = state.lock().unwrap();
        assert_eq!(s.created, 1, "exactly one surface instance");
        assert!(s.visible);
    }

    #[test]
    fn open_on_visible_surface_cycles_to_foreground() {
        let (state, mut ctl) = controller(true);

        ctl.open();
        ctl.open();

        let s = state.lock().unwrap();
        assert_eq!(s.created, 1);
        assert_eq!(
            s.calls,
            vec!["show", "focus", "minimize", "restore", "focus"]
        );
    }

    #[test]
    fn open_on_hidden_surface_shows_without_recreating() {
        let (state, mut ctl) = controller(true);

        ctl.open();
        ctl.close();
        assert!(!state.lock().unwrap().visible);

        ctl.open();

        let s = state.lock().unwrap();
        assert_eq!(s.created, 1);
        assert!(s.visible);
        assert_eq!(s.calls.last(), Some(&"focus"));
    }

    #[test]
    fn close_hides_but_keeps_the_instance() {
        let (state, mut ctl) = controller(true);

        ctl.open();
        ctl.close();

        assert!(ctl.exists());
        assert!(!state.lock().unwrap().visible);
    }

    #[test]
    fn close_before_any_open_is_a_no_op() {
        let (state, mut ctl) = controller(true);
        ctl.close();
        assert!(!ctl.exists());
        assert_eq!(state.lock().unwrap().created, 0);
    }

    #[test]
    fn new_task_reveals_the_surface_and_forwards_the_id() {
        let (state, mut ctl) = controller(true);

        // Surface exists but is hidden when the event arrives.
        ctl.open();
        ctl.close();

        ctl.handle_new_task("abc123");

        let s = state.lock().unwrap();
        assert!(s.visible);
        assert_eq!(s.injected, vec!["abc123".to_string()]);
    }

    #[test]
    fn new_task_is_dropped_when_injection_is_unsupported() {
        let (state, mut ctl) = controller(false);

        ctl.handle_new_task("abc123");

        let s = state.lock().unwrap();
        assert!(s.visible, "the surface is still revealed");
        assert!(s.injected.is_empty());
    }

    #[test]
    fn headless_controller_ignores_open_requests() {
        let mut ctl = SurfaceController::new(None, "http://127.0.0.1:8080".into(), false);
        ctl.open();
        ctl.handle_new_task("abc123");
        assert!(!ctl.exists());
    }
}
