//! # Dashboard
//!
//! Runs the page-level control flow:
//!
//! 1. On start the identity gate resolves the initial state (dev bypass,
//!    cached session, or sign-in prompt).
//! 2. Becoming authenticated shows the stream container and initializes every
//!    camera in order.
//! 3. The page becoming visible again triggers a health sweep, even while
//!    start-up is still working through the cameras.
//! 4. Signing out shows the login screen and releases every transport.
//! 5. Shutdown releases every transport and ends the loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::identity::{AuthState, IdentityGate};
use crate::streams::StreamManager;
use crate::surface::PageView;

/// Events the host environment feeds into the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The identity provider delivered a signed credential.
    Credential(String),
    /// The page was hidden or shown.
    VisibilityChanged {
        /// `true` when the page went to the background.
        hidden: bool,
    },
    /// The user asked to sign out.
    SignOut,
    /// Log a status line per camera.
    StatusReport,
    /// The page is going away.
    Shutdown,
}

/// Owns the gate and the manager and drives both from host events.
pub struct Dashboard {
    gate: Arc<IdentityGate>,
    manager: Arc<StreamManager>,
    page: Arc<dyn PageView>,
    signed_in: Option<String>,
    startup: Option<JoinHandle<()>>,
    sweeps: Vec<JoinHandle<()>>,
}

impl Dashboard {
    /// Wires the components together. Nothing runs until [`Dashboard::run`].
    pub fn new(gate: Arc<IdentityGate>, manager: Arc<StreamManager>, page: Arc<dyn PageView>) -> Self {
        Self {
            gate,
            manager,
            page,
            signed_in: None,
            startup: None,
            sweeps: Vec::new(),
        }
    }

    /// The stream manager.
    pub fn manager(&self) -> &Arc<StreamManager> {
        &self.manager
    }

    /// The identity gate.
    pub fn gate(&self) -> &Arc<IdentityGate> {
        &self.gate
    }

    /// Processes host events until `Shutdown` or until the sender is dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<HostEvent>) {
        let mut auth = self.gate.subscribe();
        let initial = self.gate.start();
        auth.borrow_and_update();
        self.apply_auth(initial).await;

        loop {
            tokio::select! {
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = auth.borrow_and_update().clone();
                    self.apply_auth(state).await;
                }
                event = events.recv() => {
                    match event {
                        Some(HostEvent::Credential(token)) => {
                            // Failures are already on the banner.
                            let _ = self.gate.handle_credential(&token);
                        }
                        Some(HostEvent::VisibilityChanged { hidden: true }) => {
                            log::debug!("Page hidden");
                        }
                        Some(HostEvent::VisibilityChanged { hidden: false }) => self.on_visible(),
                        Some(HostEvent::SignOut) => self.gate.sign_out(),
                        Some(HostEvent::StatusReport) => self.report_status(),
                        Some(HostEvent::Shutdown) | None => break,
                    }
                }
            }
        }

        log::info!("Dashboard shutting down");
        self.stop_streaming().await;
    }

    async fn apply_auth(&mut self, state: AuthState) {
        match state {
            AuthState::Authenticated(user) => {
                self.page.show_streams(&user.email);
                if self.signed_in.replace(user.email).is_none() {
                    let manager = Arc::clone(&self.manager);
                    self.startup = Some(tokio::spawn(async move { manager.initialize_all().await }));
                }
            }
            AuthState::SignedOut => {
                self.page.show_login();
                if self.signed_in.take().is_some() {
                    self.stop_streaming().await;
                }
            }
        }
    }

    fn on_visible(&mut self) {
        if self.signed_in.is_none() {
            return;
        }
        self.sweeps.retain(|sweep| !sweep.is_finished());
        log::info!("Page visible, checking camera health...");
        let manager = Arc::clone(&self.manager);
        self.sweeps.push(tokio::spawn(async move {
            manager.health_sweep().await;
        }));
    }

    fn report_status(&self) {
        match &self.signed_in {
            Some(email) => log::info!("Signed in as {}", email),
            None => log::info!("Signed out"),
        }
        for camera in self.manager.snapshot() {
            match camera.transport {
                Some(kind) => log::info!("[{}] {} via {:?}", camera.camera, camera.status, kind),
                None => log::info!("[{}] {}", camera.camera, camera.status),
            }
        }
    }

    async fn stop_streaming(&mut self) {
        let mut tasks: Vec<JoinHandle<()>> = self.sweeps.drain(..).collect();
        tasks.extend(self.startup.take());
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        self.manager.release_all().await;
    }
}
