//! Operator interrupt handling.
//!
//! Signal interception is scoped to a campaign: [`SignalGuard::install`]
//! registers SIGINT/SIGTERM listeners and dropping the guard releases them.

use tokio::sync::oneshot;

/// Source of operator interrupts consumed by the campaign controller.
#[async_trait::async_trait]
pub trait Interrupt: Send {
    /// Resolve once the operator asked the run to stop.
    ///
    /// Must be cancel safe: the controller drops and re-creates this future
    /// between events.
    async fn wait(&mut self);
}

/// SIGINT/SIGTERM listener held for the lifetime of one run.
#[derive(Debug)]
pub struct SignalGuard {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalGuard {
    /// Register interrupt and terminate listeners.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let guard = Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            };
            tracing::debug!("Signal handlers installed");
            Ok(guard)
        }

        #[cfg(not(unix))]
        {
            tracing::debug!("Signal handlers installed");
            Ok(Self {})
        }
    }
}

#[async_trait::async_trait]
impl Interrupt for SignalGuard {
    async fn wait(&mut self) {
        #[cfg(unix)]
        tokio::select! {
            _ = self.interrupt.recv() => {
                tracing::info!("Received interrupt signal");
            }
            _ = self.terminate.recv() => {
                tracing::info!("Received terminate signal");
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C signal");
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        tracing::debug!("Signal handlers released");
    }
}

/// Programmatic interrupt: fires when the paired sender sends or is dropped.
#[async_trait::async_trait]
impl Interrupt for oneshot::Receiver<()> {
    async fn wait(&mut self) {
        let _ = self.await;
    }
}

/// Interrupt that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInterrupt;

#[async_trait::async_trait]
impl Interrupt for NoInterrupt {
    async fn wait(&mut self) {
        std::future::pending::<()>().await;
    }
}
