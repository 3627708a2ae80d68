use tokio::sync::watch;

/// Shutdown broadcaster held by the composition root.
///
/// Call [`ShutdownHandle::subscribe`] once per subsystem that must honor
/// shutdown, then [`ShutdownHandle::trigger`] to notify them all.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Create an independent receiver for one subsystem.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Broadcast shutdown to every outstanding [`ShutdownSignal`].
    pub fn trigger(&self) {
        // Errors only if all receivers are gone — harmless at that point.
        let _ = self.tx.send(true);
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side. Clone freely; each clone observes the signal independently.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait until shutdown has been triggered. Resolves immediately if it
    /// already was.
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|&v| v).await;
    }
}

/// Wait for `SIGINT` (Ctrl-C) or `SIGTERM` (container stop / kill).
pub async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = sigint.recv()  => tracing::info!("🔔 SIGINT received"),
        _ = sigterm.recv() => tracing::info!("🔔 SIGTERM received"),
    }
}
