use std::fmt;

use tokio::sync::watch;

/// Why the server is stopping. The first reason recorded wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    /// The scene reached its configured `max_ticks`.
    TickLimit,
    SceneFailure,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::TickLimit => write!(f, "tick limit reached"),
            Self::SceneFailure => write!(f, "scene failure"),
        }
    }
}

#[derive(Clone)]
pub struct ShutdownTx(watch::Sender<Option<ShutdownReason>>);

/// Cloned into the tick thread and each async task.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<Option<ShutdownReason>>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(None);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    /// Record `reason` unless a shutdown is already under way.
    /// Returns true if this call started the shutdown.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.0.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }
}

impl ShutdownRx {
    /// Resolves once shutdown starts, or with `None` if every sender is gone.
    pub async fn wait(&mut self) -> Option<ShutdownReason> {
        loop {
            if let Some(reason) = *self.0.borrow() {
                return Some(reason);
            }
            if self.0.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.0.borrow()
    }

    /// Polled by the scene tick loop between ticks.
    pub fn is_shutdown(&self) -> bool {
        self.reason().is_some()
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
/// Never resolves if the handlers cannot be installed.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let installed = signal(SignalKind::interrupt()).and_then(|i| Ok((i, signal(SignalKind::terminate())?)));
        let (mut sigint, mut sigterm) = match installed {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "failed to register signal handlers");
                return std::future::pending().await;
            }
        };
        tokio::select! {
            _ = sigint.recv() => { tracing::info!("received SIGINT"); }
            _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return std::future::pending().await;
        }
        tracing::info!("received Ctrl+C");
    }
}
